//! Slash command handling for the REPL.

use skillet_agent::{generate_session_id, Orchestrator};

use super::ReplState;
use crate::output;

/// Result of command execution.
pub enum CommandResult {
    /// Continue the REPL loop
    Continue,
    /// Exit the REPL
    Exit,
    /// An error occurred
    Error(String),
}

/// Handle a slash command.
pub async fn handle_command(
    input: &str,
    orchestrator: &Orchestrator,
    state: &mut ReplState,
) -> CommandResult {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let command = parts.first().copied().unwrap_or("");

    match command {
        "/help" | "/h" | "/?" => {
            print_help();
            CommandResult::Continue
        }
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            CommandResult::Exit
        }
        "/clear" => {
            // Clear screen using ANSI escape codes
            print!("\x1B[2J\x1B[1;1H");
            CommandResult::Continue
        }
        "/new" => {
            orchestrator.memory().clear_session(&state.session_id);
            state.session_id = generate_session_id();
            println!("[Session: {}]", state.session_id);
            CommandResult::Continue
        }
        "/debug" => {
            state.debug = !state.debug;
            println!(
                "[Debug output: {}]",
                if state.debug { "on" } else { "off" }
            );
            CommandResult::Continue
        }
        "/skills" => {
            output::print_skills(&orchestrator.skills().descriptors());
            CommandResult::Continue
        }
        "/mcp" => {
            let statuses = orchestrator.server_statuses().await;
            output::print_servers(&statuses);
            CommandResult::Continue
        }
        "/tools" => {
            output::print_tools(&orchestrator.all_tools());
            CommandResult::Continue
        }
        "/stats" => {
            print!("{}", orchestrator.recorder().export_markdown());
            CommandResult::Continue
        }
        _ => CommandResult::Error(format!(
            "Unknown command: {}. Type /help for available commands.",
            command
        )),
    }
}

/// Print help information.
fn print_help() {
    println!("Available commands:");
    println!();
    println!("  /help, /h, /?    Show this help message");
    println!("  /exit, /quit, /q Exit the REPL");
    println!("  /clear           Clear the screen");
    println!("  /new             Start a fresh conversation session");
    println!("  /debug           Toggle plan and timeline output");
    println!("  /skills          List registered skills");
    println!("  /mcp             Show MCP server connection states");
    println!("  /tools           List the tools the servers expose");
    println!("  /stats           Show tool-call statistics");
    println!();
    println!("Tips:");
    println!("  - Press Ctrl+D to exit");
    println!("  - Use Up/Down arrows for input history");
    println!("  - Start skillet with --debug to see every run's timeline");
}
