//! MCP server inspection commands.

use skillet_agent::Orchestrator;

use crate::{output, McpAction};

pub async fn handle(action: McpAction, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let report = orchestrator.initialize().await?;
    for (server, reason) in &report.unavailable {
        tracing::warn!(server = %server, reason = %reason, "Server unavailable");
    }

    match action {
        McpAction::List => {
            let statuses = orchestrator.server_statuses().await;
            output::print_servers(&statuses);
        }
        McpAction::Tools => {
            let tools = orchestrator.all_tools();
            output::print_tools(&tools);
        }
    }

    orchestrator.close().await;
    Ok(())
}
