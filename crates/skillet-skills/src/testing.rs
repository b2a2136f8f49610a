//! Shared test doubles for skill and context tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use skillet_core::{ErrorKind, ToolOutcome};
use skillet_llm::{ChatRequest, LlmClient, LlmError};
use skillet_trace::{ToolRecorder, Tracer};

use crate::context::{SkillContext, ToolInvoker};

type Script = Box<dyn Fn(&str, &str, &Map<String, Value>) -> ToolOutcome + Send + Sync>;

/// Tool invoker answering from a script and logging every call.
pub struct ScriptedInvoker {
    script: Script,
    servers: Vec<String>,
    log: Mutex<Vec<(String, String, Map<String, Value>)>>,
}

impl ScriptedInvoker {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, &str, &Map<String, Value>) -> ToolOutcome + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            servers: vec!["amap-maps".to_string(), "12306-mcp".to_string()],
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn with_servers<F>(script: F, servers: &[&str]) -> Arc<Self>
    where
        F: Fn(&str, &str, &Map<String, Value>) -> ToolOutcome + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            servers: servers.iter().map(|s| s.to_string()).collect(),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.log.lock().len()
    }

    pub fn call_log(&self) -> Vec<(String, String, Map<String, Value>)> {
        self.log.lock().clone()
    }
}

#[async_trait]
impl ToolInvoker for ScriptedInvoker {
    fn has_server(&self, name: &str) -> bool {
        self.servers.iter().any(|s| s == name)
    }

    async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Map<String, Value>,
    ) -> ToolOutcome {
        self.log
            .lock()
            .push((server.to_string(), tool.to_string(), arguments.clone()));
        (self.script)(server, tool, &arguments)
    }
}

/// Invoker whose every call succeeds with `{"ok": true}`.
pub fn ok_invoker() -> Arc<ScriptedInvoker> {
    ScriptedInvoker::new(|_, _, _| ToolOutcome::ok(json!({"ok": true})))
}

/// Invoker whose every call fails with the given error.
pub fn failing_invoker(kind: ErrorKind, message: &str) -> Arc<ScriptedInvoker> {
    let message = message.to_string();
    ScriptedInvoker::new(move |_, _, _| ToolOutcome::err(kind, message.clone()))
}

/// LLM returning a canned reply (or failure) and logging every request.
pub struct ScriptedLlm {
    reply: Result<String, String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn reply(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// All message contents of the most recent request, joined.
    pub fn last_prompt(&self) -> String {
        self.requests
            .lock()
            .last()
            .map(|request| {
                request
                    .messages
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().push(request);
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(LlmError::Api {
                status: 500,
                body: message.clone(),
            }),
        }
    }
}

/// Context wired with fakes and a fresh tracer/recorder.
pub fn test_context(invoker: Arc<dyn ToolInvoker>, llm: Arc<dyn LlmClient>) -> SkillContext {
    SkillContext::new(
        "test-session",
        invoker,
        llm,
        Arc::new(Tracer::start("test query")),
        Arc::new(ToolRecorder::new(100)),
    )
}
