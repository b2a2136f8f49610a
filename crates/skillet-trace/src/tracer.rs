//! Per-run execution timeline.
//!
//! One `Tracer` lives for one orchestration run. Every event carries an
//! offset from the run's monotonic origin, so the collected timeline is
//! ordered and replayable regardless of wall-clock adjustments.

use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceEventType {
    RunStart,
    PlannerStart,
    PlannerEnd,
    SkillSelected,
    ToolCallStart,
    ToolCallEnd,
    RunEnd,
}

impl std::fmt::Display for TraceEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RunStart => "run-start",
            Self::PlannerStart => "planner-start",
            Self::PlannerEnd => "planner-end",
            Self::SkillSelected => "skill-selected",
            Self::ToolCallStart => "tool-call-start",
            Self::ToolCallEnd => "tool-call-end",
            Self::RunEnd => "run-end",
        };
        write!(f, "{}", name)
    }
}

/// One event on the run's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub event_type: TraceEventType,
    /// Milliseconds since the run's origin. Non-decreasing.
    pub offset_ms: u64,
    /// Free-form event details.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

/// Serializable rendering of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceReport {
    /// Offset of the last event.
    pub total_ms: u64,
    /// Number of events recorded.
    pub event_count: usize,
    /// The events, in recording order.
    pub events: Vec<TraceEvent>,
}

impl TraceReport {
    /// Render the run as a human-auditable text timeline.
    pub fn timeline(&self) -> String {
        let mut out = String::new();
        for event in &self.events {
            out.push_str(&format!("[{:>6}ms] {}", event.offset_ms, event.event_type));
            if !event.payload.is_empty() {
                if let Ok(details) = serde_json::to_string(&event.payload) {
                    out.push(' ');
                    out.push_str(&details);
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Ordered, append-only event log for one orchestration run.
pub struct Tracer {
    origin: Instant,
    events: Mutex<Vec<TraceEvent>>,
}

impl Tracer {
    /// Open a run. Records `run-start` against a fresh monotonic origin.
    pub fn start(query: impl Into<String>) -> Self {
        let tracer = Self {
            origin: Instant::now(),
            events: Mutex::new(Vec::new()),
        };
        tracer.record(
            TraceEventType::RunStart,
            serde_json::json!({"query": query.into()}),
        );
        tracer
    }

    fn offset_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// Append one event. The payload should be a `json!` object literal;
    /// non-object payloads are recorded without details.
    pub fn record(&self, event_type: TraceEventType, payload: Value) {
        let event = TraceEvent {
            event_type,
            offset_ms: self.offset_ms(),
            payload: payload.as_object().cloned().unwrap_or_default(),
        };
        self.events.lock().push(event);
    }

    /// Record a start event and return a guard for the matching end.
    ///
    /// The end event is recorded exactly once: explicitly via
    /// [`TraceScope::finish`], or by the guard's drop with an `aborted`
    /// marker when the scope exits early.
    pub fn scope(
        &self,
        start: TraceEventType,
        end: TraceEventType,
        payload: Value,
    ) -> TraceScope<'_> {
        self.record(start, payload);
        TraceScope {
            tracer: self,
            end,
            finished: false,
        }
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Render the run as a serializable report.
    pub fn report(&self) -> TraceReport {
        let events = self.events();
        TraceReport {
            total_ms: events.last().map(|e| e.offset_ms).unwrap_or(0),
            event_count: events.len(),
            events,
        }
    }

    /// Render the run as a human-auditable text timeline.
    pub fn timeline(&self) -> String {
        self.report().timeline()
    }
}

/// Guard for a scoped phase; records the end event when finished or
/// dropped.
pub struct TraceScope<'a> {
    tracer: &'a Tracer,
    end: TraceEventType,
    finished: bool,
}

impl TraceScope<'_> {
    /// Record the end event with the given payload.
    pub fn finish(mut self, payload: Value) {
        self.finished = true;
        self.tracer.record(self.end, payload);
    }
}

impl Drop for TraceScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracer
                .record(self.end, serde_json::json!({"aborted": true}));
        }
    }
}
