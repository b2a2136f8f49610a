//! Run orchestration.
//!
//! The [`Orchestrator`] owns the full pipeline and is the only type a
//! frontend needs:
//!
//! ```text
//! Orchestrator
//! ├── Planner      (keyword pass + LLM classification)
//! ├── Executor     (ordered steps over the skill registry)
//! ├── Reasoner     (synthesis + failure replies)
//! ├── MemoryStore  (rolling window per session)
//! ├── ToolRecorder (audit log shared across runs)
//! └── McpClientManager or any ToolInvoker
//! ```
//!
//! One `chat` call is one run: plan, execute, reason, remember. The
//! whole run sits under a timeout and a cancellation token, and every
//! exit path still produces a user-facing reply.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skillet_core::{Config, Error, ErrorDetail, Plan, ToolDescriptor};
use skillet_llm::LlmClient;
use skillet_mcp::{InitReport, McpClientManager, ServerStatus};
use skillet_skills::{SkillContext, SkillRegistry, ToolInvoker};
use skillet_trace::{ToolRecorder, TraceEventType, TraceReport, Tracer};

use crate::executor::{ExecutionReport, Executor, StepResult};
use crate::memory::MemoryStore;
use crate::planner::Planner;
use crate::reasoner::Reasoner;

// ============================================================================
// Request / Response Types
// ============================================================================

/// One inbound user message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// What the user said.
    pub message: String,
    /// Session to attach the turn to; a fresh one is opened when absent.
    pub session_id: Option<String>,
    /// Extra caller-supplied context, appended to the memory summary.
    pub context: Option<String>,
}

impl ChatRequest {
    /// Create a request for a one-off message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            context: None,
        }
    }

    /// Attach the request to a session.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Supply extra planning context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// The reply plus everything needed to audit how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Final user-facing reply. Never empty.
    pub reply: String,
    /// Structured payloads from successful steps, in plan order.
    pub structured_data: Vec<Value>,
    /// Deduplicated provenance entries, in first-seen order.
    pub sources: Vec<String>,
    /// How the reply came to be.
    pub debug_info: DebugInfo,
}

/// Debug surface of one run.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    /// Session the run belonged to.
    pub session_id: String,
    /// The plan, when planning got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    /// Per-step results, empty when execution never started.
    pub steps: Vec<StepResult>,
    /// Why the run was cut short, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_error: Option<ErrorDetail>,
    /// The run's full event timeline.
    pub trace: TraceReport,
}

/// What a finished pipeline hands back to `chat`.
struct PipelineRun {
    plan: Plan,
    report: ExecutionReport,
    reply: String,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// The assembled pipeline. Create one with [`Orchestrator::builder`].
pub struct Orchestrator {
    config: Config,
    manager: Option<Arc<McpClientManager>>,
    invoker: Arc<dyn ToolInvoker>,
    llm: Arc<dyn LlmClient>,
    skills: Arc<SkillRegistry>,
    planner: Planner,
    executor: Executor,
    reasoner: Reasoner,
    memory: MemoryStore,
    recorder: Arc<ToolRecorder>,
    cancel_token: CancellationToken,
}

impl Orchestrator {
    /// Start building an orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Connect the configured tool servers and seal the tool registry.
    ///
    /// Without a manager (tests, tool-less deployments) this is a no-op
    /// reporting zero servers.
    pub async fn initialize(&self) -> Result<InitReport, Error> {
        match &self.manager {
            Some(manager) => manager.initialize().await.map_err(Error::from),
            None => Ok(InitReport::default()),
        }
    }

    /// Close all tool-server sessions.
    pub async fn close(&self) {
        if let Some(manager) = &self.manager {
            manager.close().await;
        }
    }

    /// Run one chat turn.
    ///
    /// Planning or run-level failures (timeout, cancellation, missing
    /// fallback skill at the planning edge) degrade to an apology
    /// reply; the error itself is preserved in the debug surface.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, Error> {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(generate_session_id);

        info!(
            session_id = %session_id,
            message_chars = request.message.chars().count(),
            "Chat run started"
        );

        let tracer = Arc::new(Tracer::start(request.message.as_str()));

        let summary = self.memory.with_session(&session_id, |memory| {
            memory.add_user(&request.message);
            memory.context_summary(self.config.memory.summary_turns)
        });
        let context = match &request.context {
            Some(extra) if !extra.is_empty() && summary.is_empty() => extra.clone(),
            Some(extra) if !extra.is_empty() => format!("{summary}\n{extra}"),
            _ => summary,
        };

        let outcome = tokio::select! {
            _ = self.cancel_token.cancelled() => {
                Err(Error::Cancelled("run cancelled before completion".into()))
            }
            result = tokio::time::timeout(
                self.config.run.timeout(),
                self.run_pipeline(&request.message, &session_id, &context, &tracer),
            ) => match result {
                Ok(inner) => inner,
                Err(_) => Err(Error::timeout(format!(
                    "run exceeded {}s",
                    self.config.run.timeout_secs
                ))),
            },
        };

        let (plan, report, reply, run_error) = match outcome {
            Ok(run) => (Some(run.plan), Some(run.report), run.reply, None),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Run cut short");
                let reply = self.reasoner.handle_failure(&request.message, &e.to_string()).await;
                (None, None, reply, Some(ErrorDetail::from(&e)))
            }
        };

        tracer.record(
            TraceEventType::RunEnd,
            json!({"success": run_error.is_none()}),
        );

        self.memory
            .with_session(&session_id, |memory| memory.add_assistant(&reply));

        let (structured_data, sources) = collect_surfaces(report.as_ref());

        info!(
            session_id = %session_id,
            reply_chars = reply.chars().count(),
            success = run_error.is_none(),
            "Chat run finished"
        );

        Ok(ChatResponse {
            reply,
            structured_data,
            sources,
            debug_info: DebugInfo {
                session_id,
                plan,
                steps: report.map(|r| r.steps).unwrap_or_default(),
                run_error,
                trace: tracer.report(),
            },
        })
    }

    async fn run_pipeline(
        &self,
        query: &str,
        session_id: &str,
        context: &str,
        tracer: &Arc<Tracer>,
    ) -> Result<PipelineRun, Error> {
        debug!("Phase 1: planning");
        let scope = tracer.scope(
            TraceEventType::PlannerStart,
            TraceEventType::PlannerEnd,
            json!({"context_chars": context.chars().count()}),
        );
        let plan = self.planner.plan(query, context).await?;
        scope.finish(json!({"source": plan.source, "skills": plan.skill_names()}));

        debug!(steps = plan.len(), "Phase 2: executing");
        let ctx = SkillContext::new(
            session_id,
            Arc::clone(&self.invoker),
            Arc::clone(&self.llm),
            Arc::clone(tracer),
            Arc::clone(&self.recorder),
        )
        .with_memory_summary(context);
        let report = self.executor.execute(query, &plan, &ctx).await;

        debug!(completed = report.completed(), "Phase 3: reasoning");
        let reply = if !report.aborted && report.has_output() {
            match self.reasoner.synthesize(query, &report).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "Synthesis failed, degrading to a failure reply");
                    self.reasoner.handle_failure(query, &e.to_string()).await
                }
            }
        } else {
            let error_info = report
                .first_failure()
                .map(|step| {
                    let message = step
                        .error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .unwrap_or("未知错误");
                    format!("步骤 {} 失败: {message}", step.skill)
                })
                .unwrap_or_else(|| "任务执行未能完成".to_string());
            self.reasoner.handle_failure(query, &error_info).await
        };

        Ok(PipelineRun {
            plan,
            report,
            reply,
        })
    }

    /// Cancel every in-flight and future run.
    ///
    /// The token stays cancelled until [`Orchestrator::reset_cancellation`].
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Replace a consumed cancellation token.
    pub fn reset_cancellation(&mut self) {
        self.cancel_token = CancellationToken::new();
    }

    /// The skill registry.
    pub fn skills(&self) -> &SkillRegistry {
        &self.skills
    }

    /// The shared tool-call recorder.
    pub fn recorder(&self) -> &ToolRecorder {
        &self.recorder
    }

    /// The session memory store.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Status of every configured tool server, sorted by name.
    pub async fn server_statuses(&self) -> Vec<ServerStatus> {
        match &self.manager {
            Some(manager) => manager.server_statuses().await,
            None => Vec::new(),
        }
    }

    /// Every tool registered at startup.
    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        match &self.manager {
            Some(manager) => manager.all_tools(),
            None => Vec::new(),
        }
    }
}

/// Mint a fresh session identifier.
pub fn generate_session_id() -> String {
    format!("session_{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn collect_surfaces(report: Option<&ExecutionReport>) -> (Vec<Value>, Vec<String>) {
    let mut data = Vec::new();
    let mut sources = Vec::new();
    if let Some(report) = report {
        for step in &report.steps {
            if let Some(output) = &step.output {
                if let Some(payload) = &output.data {
                    data.push(payload.clone());
                }
                for source in &output.sources {
                    if !sources.contains(source) {
                        sources.push(source.clone());
                    }
                }
            }
        }
    }
    (data, sources)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Config,
    llm: Option<Arc<dyn LlmClient>>,
    manager: Option<Arc<McpClientManager>>,
    invoker: Option<Arc<dyn ToolInvoker>>,
    skills: Option<Arc<SkillRegistry>>,
}

impl OrchestratorBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the LLM endpoint.
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Use an MCP manager for tool calls and lifecycle.
    pub fn manager(mut self, manager: Arc<McpClientManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Use a bare tool invoker; no MCP lifecycle is managed.
    pub fn invoker(mut self, invoker: Arc<dyn ToolInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Set the skill registry.
    pub fn skills(mut self, skills: Arc<SkillRegistry>) -> Self {
        self.skills = Some(skills);
        self
    }

    /// Build the orchestrator.
    ///
    /// Requires an LLM, a skill registry, and either an MCP manager or
    /// a tool invoker.
    pub fn build(self) -> Result<Orchestrator, Error> {
        let llm = self
            .llm
            .ok_or_else(|| Error::config("llm client is required"))?;
        let skills = self
            .skills
            .ok_or_else(|| Error::config("skill registry is required"))?;
        let invoker: Arc<dyn ToolInvoker> = match (self.invoker, &self.manager) {
            (Some(invoker), _) => invoker,
            (None, Some(manager)) => Arc::clone(manager) as Arc<dyn ToolInvoker>,
            (None, None) => {
                return Err(Error::config(
                    "either an MCP manager or a tool invoker is required",
                ))
            }
        };

        let config = self.config;
        config.validate()?;

        let planner = Planner::new(Arc::clone(&skills), Arc::clone(&llm), config.planner.clone());
        let executor = Executor::new(Arc::clone(&skills), config.executor.clone());
        let reasoner = Reasoner::new(Arc::clone(&llm));
        let memory = MemoryStore::new(config.memory.clone());
        let recorder = Arc::new(ToolRecorder::from_config(&config.recorder));

        Ok(Orchestrator {
            config,
            manager: self.manager,
            invoker,
            llm,
            skills,
            planner,
            executor,
            reasoner,
            memory,
            recorder,
            cancel_token: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Map;

    use skillet_core::{ErrorKind, PlanSource, RunConfig, ToolOutcome};
    use skillet_skills::builtin;
    use skillet_skills::testing::{ScriptedInvoker, ScriptedLlm};
    use skillet_skills::{Skill, SkillDescriptor, SkillOutput};

    fn standard_skills() -> Arc<SkillRegistry> {
        Arc::new(
            SkillRegistry::builder()
                .register_all(builtin::standard())
                .build()
                .unwrap(),
        )
    }

    fn weather_invoker() -> Arc<ScriptedInvoker> {
        ScriptedInvoker::new(|server, tool, _| {
            assert_eq!(server, "amap-maps");
            assert_eq!(tool, "maps_weather");
            ToolOutcome::ok(json!({
                "lives": [{"weather": "晴", "temperature": "21", "humidity": "40"}]
            }))
        })
    }

    struct SlowSkill {
        delay_ms: u64,
    }

    #[async_trait]
    impl Skill for SlowSkill {
        fn descriptor(&self) -> SkillDescriptor {
            SkillDescriptor::new("slow", "慢速技能").with_keywords(["慢速"])
        }

        async fn execute(
            &self,
            _query: &str,
            _args: &Map<String, Value>,
            _ctx: &SkillContext,
        ) -> Result<SkillOutput, Error> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(SkillOutput::text("终于完成了，这是一个较长的结果。"))
        }
    }

    #[test]
    fn test_build_requires_components() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm::reply(""));

        let err = Orchestrator::builder().build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = Orchestrator::builder()
            .llm(llm.clone())
            .skills(standard_skills())
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("invoker"));
    }

    #[tokio::test]
    async fn test_keyword_flow_end_to_end() {
        let invoker = weather_invoker();
        let llm = Arc::new(ScriptedLlm::reply("unused"));
        let orchestrator = Orchestrator::builder()
            .llm(llm.clone() as Arc<dyn LlmClient>)
            .invoker(invoker.clone() as Arc<dyn ToolInvoker>)
            .skills(standard_skills())
            .build()
            .unwrap();

        let response = orchestrator
            .chat(ChatRequest::new("北京今天天气怎么样？").with_session("s1"))
            .await
            .unwrap();

        // Weather summary flows through the direct-result shortcut.
        assert!(response.reply.contains("北京"));
        assert!(response.reply.contains("晴"));
        assert!(llm.requests().is_empty());

        let debug = &response.debug_info;
        assert_eq!(debug.session_id, "s1");
        let plan = debug.plan.as_ref().unwrap();
        assert_eq!(plan.source, PlanSource::Keyword);
        assert_eq!(plan.confidence, 0.9);
        assert_eq!(plan.skill_names(), vec!["weather"]);
        assert_eq!(plan.steps[0].args.get("city"), Some(&json!("北京")));
        assert!(debug.run_error.is_none());

        assert_eq!(response.sources, vec!["amap-maps/maps_weather"]);
        assert_eq!(response.structured_data[0]["city"], "北京");

        // Full deterministic timeline for a one-step keyword run.
        let kinds: Vec<_> = debug.trace.events.iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                TraceEventType::RunStart,
                TraceEventType::PlannerStart,
                TraceEventType::PlannerEnd,
                TraceEventType::SkillSelected,
                TraceEventType::ToolCallStart,
                TraceEventType::ToolCallEnd,
                TraceEventType::RunEnd,
            ]
        );

        // Both turns landed in session memory.
        assert_eq!(orchestrator.memory().with_session("s1", |m| m.len()), 2);
        // The call was sealed into the shared recorder.
        assert_eq!(orchestrator.recorder().stats().total_calls, 1);
    }

    #[tokio::test]
    async fn test_fallback_plan_reaches_direct_answer() {
        let invoker = weather_invoker();
        // One reply serves both the failed classification parse and the
        // direct_answer completion.
        let llm = Arc::new(ScriptedLlm::reply("你好！有什么可以帮您？"));
        let orchestrator = Orchestrator::builder()
            .llm(llm.clone() as Arc<dyn LlmClient>)
            .invoker(invoker as Arc<dyn ToolInvoker>)
            .skills(standard_skills())
            .build()
            .unwrap();

        let response = orchestrator
            .chat(ChatRequest::new("你好呀"))
            .await
            .unwrap();

        assert_eq!(response.reply, "你好！有什么可以帮您？");
        let plan = response.debug_info.plan.as_ref().unwrap();
        assert!(plan.is_fallback());
        assert_eq!(plan.skill_names(), vec!["direct_answer"]);
        // Classification, then the direct_answer chat call.
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_failure_still_produces_apology() {
        let invoker = ScriptedInvoker::new(|_, _, _| {
            ToolOutcome::err(ErrorKind::Transport, "connection refused")
        });
        // LLM down as well: the canned apology is the last line of defense.
        let llm = Arc::new(ScriptedLlm::failing("model down"));
        let orchestrator = Orchestrator::builder()
            .llm(llm as Arc<dyn LlmClient>)
            .invoker(invoker as Arc<dyn ToolInvoker>)
            .skills(standard_skills())
            .build()
            .unwrap();

        let response = orchestrator
            .chat(ChatRequest::new("北京今天天气怎么样？"))
            .await
            .unwrap();

        assert!(!response.reply.trim().is_empty());
        assert!(response.reply.contains("抱歉"));
        assert!(response.sources.is_empty());

        let debug = &response.debug_info;
        assert!(debug.steps[0].error.is_some());
        assert!(debug.run_error.is_none());
    }

    #[tokio::test]
    async fn test_run_timeout_still_replies() {
        let mut config = Config::default();
        config.run = RunConfig { timeout_secs: 1 };
        let registry = Arc::new(
            SkillRegistry::builder()
                .register(Arc::new(SlowSkill { delay_ms: 3000 }))
                .build()
                .unwrap(),
        );
        let orchestrator = Orchestrator::builder()
            .config(config)
            .llm(Arc::new(ScriptedLlm::failing("model down")) as Arc<dyn LlmClient>)
            .invoker(weather_invoker() as Arc<dyn ToolInvoker>)
            .skills(registry)
            .build()
            .unwrap();

        let response = orchestrator
            .chat(ChatRequest::new("慢速任务"))
            .await
            .unwrap();

        assert!(!response.reply.trim().is_empty());
        assert!(response.reply.contains("抱歉"));

        let debug = &response.debug_info;
        assert_eq!(debug.run_error.as_ref().unwrap().kind, ErrorKind::Timeout);
        assert!(debug.plan.is_none());
        assert!(debug.steps.is_empty());
        // The timeline still closed with run-end.
        let last = debug.trace.events.last().unwrap();
        assert_eq!(last.event_type, TraceEventType::RunEnd);
        assert_eq!(last.payload["success"], false);
    }

    #[tokio::test]
    async fn test_cancellation_during_run() {
        let registry = Arc::new(
            SkillRegistry::builder()
                .register(Arc::new(SlowSkill { delay_ms: 3000 }))
                .build()
                .unwrap(),
        );
        let orchestrator = Arc::new(
            Orchestrator::builder()
                .llm(Arc::new(ScriptedLlm::failing("model down")) as Arc<dyn LlmClient>)
                .invoker(weather_invoker() as Arc<dyn ToolInvoker>)
                .skills(registry)
                .build()
                .unwrap(),
        );

        let worker = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.chat(ChatRequest::new("慢速任务")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        orchestrator.cancel();

        let response = worker.await.unwrap().unwrap();
        assert!(!response.reply.trim().is_empty());
        let error = response.debug_info.run_error.as_ref().unwrap();
        assert!(error.message.contains("cancelled"));
        assert!(orchestrator.is_cancelled());
    }

    #[tokio::test]
    async fn test_session_id_generated_when_absent() {
        let orchestrator = Orchestrator::builder()
            .llm(Arc::new(ScriptedLlm::reply("你好！有什么可以帮您？")) as Arc<dyn LlmClient>)
            .invoker(weather_invoker() as Arc<dyn ToolInvoker>)
            .skills(standard_skills())
            .build()
            .unwrap();

        let response = orchestrator.chat(ChatRequest::new("你好")).await.unwrap();
        assert!(response.debug_info.session_id.starts_with("session_"));
    }
}
