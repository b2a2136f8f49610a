//! Print mode (non-interactive single response).

use skillet_agent::{ChatRequest, Orchestrator};

use crate::{output, Cli};

pub async fn run(prompt: &str, cli: &Cli, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let report = orchestrator.initialize().await?;
    for (server, reason) in &report.unavailable {
        tracing::warn!(server = %server, reason = %reason, "Server unavailable");
    }

    let response = orchestrator.chat(ChatRequest::new(prompt)).await?;

    println!("{}", response.reply);

    if !response.sources.is_empty() {
        println!();
        println!("[Sources: {}]", response.sources.join(", "));
    }

    if cli.debug {
        output::print_debug(&response);
    }

    orchestrator.close().await;
    Ok(())
}
