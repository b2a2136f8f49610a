//! Interactive REPL mode.
//!
//! A readline loop with:
//! - Input history
//! - Slash commands
//! - A per-process conversation session
//! - Optional debug output after each reply

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use skillet_agent::{generate_session_id, ChatRequest, Orchestrator};
use skillet_mcp::InitReport;

use crate::{output, Cli};

mod commands;

/// REPL state that slash commands may change.
pub struct ReplState {
    pub session_id: String,
    pub debug: bool,
}

/// Run the interactive REPL.
pub async fn run(cli: Cli, mut orchestrator: Orchestrator) -> anyhow::Result<()> {
    // Connect tool servers; unavailable ones degrade, they do not abort
    let report = orchestrator.initialize().await?;

    print_welcome_banner(&orchestrator, &report);

    let mut state = ReplState {
        session_id: generate_session_id(),
        debug: cli.debug,
    };
    println!("[Session: {}]", state.session_id);
    println!();

    // Initialize readline editor
    let mut editor = DefaultEditor::new()?;

    // Load history if it exists
    let history_path = get_history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
    }

    // Send the initial prompt before handing over the input line
    if let Some(ref prompt) = cli.prompt {
        println!(">>> {}", prompt);
        if let Err(e) = process_message(prompt, &mut orchestrator, &state).await {
            eprintln!("Error: {}", e);
        }
    }

    // Main REPL loop
    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                // Add to history
                let _ = editor.add_history_entry(line);

                // Handle slash commands
                if line.starts_with('/') {
                    match commands::handle_command(line, &orchestrator, &mut state).await {
                        commands::CommandResult::Continue => continue,
                        commands::CommandResult::Exit => break,
                        commands::CommandResult::Error(e) => {
                            eprintln!("Error: {}", e);
                            continue;
                        }
                    }
                }

                // Process as a message to the pipeline
                if let Err(e) = process_message(line, &mut orchestrator, &state).await {
                    eprintln!("Error: {}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                // Cancel any ongoing operation
                orchestrator.cancel();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    // Save history
    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = editor.save_history(&history_path);

    orchestrator.close().await;

    Ok(())
}

/// Send one line through the pipeline and print the reply.
async fn process_message(
    input: &str,
    orchestrator: &mut Orchestrator,
    state: &ReplState,
) -> anyhow::Result<()> {
    // A ^C from an earlier turn must not cancel this one
    orchestrator.reset_cancellation();

    let request = ChatRequest::new(input).with_session(state.session_id.clone());
    let response = orchestrator.chat(request).await?;

    println!();
    println!("{}", response.reply);

    if !response.sources.is_empty() {
        println!();
        println!("[Sources: {}]", response.sources.join(", "));
    }

    if state.debug {
        output::print_debug(&response);
    }

    Ok(())
}

/// Print the welcome banner.
fn print_welcome_banner(orchestrator: &Orchestrator, report: &InitReport) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!(
        "║  skillet v{}                                              ║",
        env!("CARGO_PKG_VERSION")
    );
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Type /help for commands, or start chatting.                 ║");
    println!("║  Press Ctrl+D to exit, Ctrl+C to cancel.                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    println!(
        "[Model: {} | Skills: {}]",
        orchestrator.config().llm.model,
        orchestrator.skills().len()
    );

    if report.connected.is_empty() {
        println!("[No MCP servers connected]");
    } else {
        println!("[Servers: {}]", report.connected.join(", "));
    }
    for (server, reason) in &report.unavailable {
        println!("[Warning: {} unavailable: {}]", server, reason);
    }
}

/// Get the path to the history file.
fn get_history_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skillet")
        .join("history.txt")
}
