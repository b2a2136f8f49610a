//! The orchestration context handed to every skill.
//!
//! Skills never reach for global state: everything they may touch
//! during execution arrives through a [`SkillContext`]. Tool calls go
//! through [`SkillContext::call_tool`], the single choke point where
//! tracing and call recording happen.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::error;

use skillet_core::{Error, ToolOutcome};
use skillet_llm::{ChatRequest, LlmClient};
use skillet_mcp::McpClientManager;
use skillet_trace::{ToolRecorder, TraceEventType, Tracer};

use crate::skill::SkillOutput;

/// Gateway skills use to reach tool servers.
///
/// [`McpClientManager`] is the production implementation; tests
/// substitute scripted fakes.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Whether a server with this name is configured.
    fn has_server(&self, name: &str) -> bool;

    /// Invoke a tool. Failures come back as structured outcomes, never
    /// as raised errors.
    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> ToolOutcome;
}

#[async_trait]
impl ToolInvoker for McpClientManager {
    fn has_server(&self, name: &str) -> bool {
        McpClientManager::has_server(self, name)
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> ToolOutcome {
        McpClientManager::call_tool(self, server, tool, arguments).await
    }
}

/// Everything a skill may reach during one plan step.
#[derive(Clone)]
pub struct SkillContext {
    session_id: String,
    memory_summary: String,
    /// Outputs of the steps this one depends on, keyed by skill name.
    prior_outputs: BTreeMap<String, SkillOutput>,
    invoker: Arc<dyn ToolInvoker>,
    llm: Arc<dyn LlmClient>,
    tracer: Arc<Tracer>,
    recorder: Arc<ToolRecorder>,
}

impl SkillContext {
    /// Create a context for one run.
    pub fn new(
        session_id: impl Into<String>,
        invoker: Arc<dyn ToolInvoker>,
        llm: Arc<dyn LlmClient>,
        tracer: Arc<Tracer>,
        recorder: Arc<ToolRecorder>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            memory_summary: String::new(),
            prior_outputs: BTreeMap::new(),
            invoker,
            llm,
            tracer,
            recorder,
        }
    }

    /// Attach the conversation summary from memory.
    pub fn with_memory_summary(mut self, summary: impl Into<String>) -> Self {
        self.memory_summary = summary.into();
        self
    }

    /// Replace the prior step outputs visible to this step.
    pub fn with_prior_outputs(mut self, outputs: BTreeMap<String, SkillOutput>) -> Self {
        self.prior_outputs = outputs;
        self
    }

    /// The chat session this run belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Rolling summary of the recent conversation, possibly empty.
    pub fn memory_summary(&self) -> &str {
        &self.memory_summary
    }

    /// Output of a dependency step, if it ran and succeeded.
    pub fn prior_output(&self, skill: &str) -> Option<&SkillOutput> {
        self.prior_outputs.get(skill)
    }

    /// All dependency outputs, in skill-name order.
    pub fn prior_outputs(&self) -> &BTreeMap<String, SkillOutput> {
        &self.prior_outputs
    }

    /// Whether a tool server with this name is configured.
    pub fn has_server(&self, name: &str) -> bool {
        self.invoker.has_server(name)
    }

    /// The run's tracer.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Invoke a tool, with tracing and call recording around it.
    ///
    /// This is the only path from skills to tool servers; going through
    /// it keeps the trace timeline and the call log complete.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> ToolOutcome {
        let scope = self.tracer.scope(
            TraceEventType::ToolCallStart,
            TraceEventType::ToolCallEnd,
            json!({"server": server, "tool": tool}),
        );
        let handle = self
            .recorder
            .start_call(server, tool, Value::Object(arguments.clone()));

        let outcome = self.invoker.call_tool(server, tool, arguments).await;

        if let Err(e) = self.recorder.end_call(&handle, &outcome) {
            // Only reachable through recorder misuse; surfaced, not hidden.
            error!(server = server, tool = tool, error = %e, "Failed to seal tool call record");
        }
        scope.finish(json!({
            "server": server,
            "tool": tool,
            "success": outcome.success,
            "duration_ms": outcome.duration_ms,
        }));

        outcome
    }

    /// Run one chat completion against the configured LLM.
    pub async fn chat(&self, request: ChatRequest) -> Result<String, Error> {
        self.llm.chat(request).await.map_err(Into::into)
    }
}
