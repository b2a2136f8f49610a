//! Rendering helpers shared by the subcommands and the REPL.

use skillet_agent::ChatResponse;
use skillet_core::ToolDescriptor;
use skillet_mcp::ServerStatus;
use skillet_skills::SkillDescriptor;

/// Print the skill catalog.
pub fn print_skills(descriptors: &[SkillDescriptor]) {
    if descriptors.is_empty() {
        println!("No skills registered.");
        return;
    }

    println!("Registered skills:");
    for descriptor in descriptors {
        println!(
            "  {:<16} priority {:>3}  {}",
            descriptor.name, descriptor.priority, descriptor.description
        );
        if !descriptor.keywords.is_empty() {
            println!("      keywords: {}", descriptor.keywords.join(", "));
        }
    }
}

/// Print server connection states.
pub fn print_servers(statuses: &[ServerStatus]) {
    if statuses.is_empty() {
        println!("No MCP servers configured.");
        return;
    }

    println!("Configured MCP servers:");
    for status in statuses {
        println!(
            "  {:<20} {:<6} {:<14} {} tools",
            status.name, status.transport, status.state, status.tool_count
        );
    }
}

/// Print the registered tools, qualified by server.
pub fn print_tools(tools: &[ToolDescriptor]) {
    if tools.is_empty() {
        println!("No tools registered.");
        return;
    }

    println!("Registered tools:");
    for tool in tools {
        println!("  {}/{}", tool.server_name, tool.name);
        if !tool.description.is_empty() {
            println!("      {}", tool.description);
        }
    }
}

/// Print the debug surface of a response: plan, step errors and the
/// run timeline.
pub fn print_debug(response: &ChatResponse) {
    let debug = &response.debug_info;

    println!();
    println!("--- debug ---");
    if let Some(ref plan) = debug.plan {
        match serde_json::to_string_pretty(plan) {
            Ok(json) => println!("plan ({}):\n{}", plan.source, json),
            Err(_) => println!("plan ({}): {} steps", plan.source, plan.len()),
        }
    } else {
        println!("plan: none");
    }

    if let Some(ref error) = debug.run_error {
        println!("run error [{}]: {}", error.kind, error.message);
    }
    for step in &debug.steps {
        if let Some(ref error) = step.error {
            println!(
                "step {} ({}) failed [{}]: {}",
                step.index, step.skill, error.kind, error.message
            );
        }
    }

    println!("timeline ({} events, {}ms):", debug.trace.event_count, debug.trace.total_ms);
    print!("{}", debug.trace.timeline());
    println!("-------------");
}
