//! Skill catalog listing.

use skillet_agent::Orchestrator;

use crate::output;

pub async fn handle(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    output::print_skills(&orchestrator.skills().descriptors());
    Ok(())
}
