//! Bounded tool-call audit log.
//!
//! Skills open a call with [`ToolRecorder::start_call`], receive an opaque
//! handle, and seal it with the outcome once the call returns. Sealed
//! records feed aggregate statistics and JSON/Markdown exports. The log
//! keeps the most recent `max_records` entries and drops the oldest past
//! that.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use skillet_core::config::RecorderConfig;
use skillet_core::tool::{ErrorDetail, ToolOutcome};

const DEFAULT_MAX_RECORDS: usize = 1000;

/// Recorder-level failures. Sealing mistakes are loud so double-counting
/// bugs surface in tests instead of skewing statistics.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("call handle {0} was already sealed")]
    HandleAlreadySealed(String),
    #[error("unknown call handle {0}")]
    UnknownHandle(String),
}

/// Opaque reference to an in-flight call. Obtained from
/// [`ToolRecorder::start_call`], consumed by [`ToolRecorder::end_call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHandle {
    id: String,
}

impl CallHandle {
    /// The underlying identifier, for logging.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// One sealed tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Handle identifier the call was opened under.
    pub id: String,
    /// Server that owns the tool.
    pub server_name: String,
    /// Tool that was called.
    pub tool_name: String,
    /// Arguments as sent.
    pub arguments: Value,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Structured error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Span from `start_call` to `end_call` in milliseconds.
    pub duration_ms: u64,
    /// Wall-clock time the call was opened.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time the call was sealed; never precedes `started_at`.
    pub ended_at: DateTime<Utc>,
}

impl ToolCallRecord {
    /// Fully qualified `server/tool` name.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.server_name, self.tool_name)
    }
}

/// Aggregate statistics over the sealed records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderStats {
    pub total_calls: usize,
    pub successes: usize,
    pub failures: usize,
    /// Failures over total, in `[0, 1]`. Zero when no calls were made.
    pub error_rate: f64,
    pub mean_duration_ms: f64,
    /// Nearest-rank percentiles over call durations.
    pub p50_duration_ms: u64,
    pub p95_duration_ms: u64,
    /// Per-tool breakdown, keyed by qualified `server/tool` name.
    pub per_tool: BTreeMap<String, ToolStats>,
}

/// Statistics for one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolStats {
    pub calls: usize,
    pub successes: usize,
    pub failures: usize,
    pub mean_duration_ms: f64,
}

/// Full export payload: stats plus the raw records behind them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderReport {
    pub generated_at: DateTime<Utc>,
    pub stats: RecorderStats,
    pub records: Vec<ToolCallRecord>,
}

struct OpenCall {
    server_name: String,
    tool_name: String,
    arguments: Value,
    started: Instant,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderInner {
    open: HashMap<String, OpenCall>,
    sealed: VecDeque<ToolCallRecord>,
}

/// Thread-safe recorder shared by every skill in a run.
pub struct ToolRecorder {
    inner: Mutex<RecorderInner>,
    max_records: usize,
}

impl Default for ToolRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl ToolRecorder {
    /// Create a recorder keeping at most `max_records` sealed records.
    /// At least one record is always retained.
    pub fn new(max_records: usize) -> Self {
        Self {
            inner: Mutex::new(RecorderInner::default()),
            max_records: max_records.max(1),
        }
    }

    /// Create a recorder from configuration.
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(config.max_records)
    }

    /// Open a call and return its handle.
    pub fn start_call(&self, server: &str, tool: &str, arguments: Value) -> CallHandle {
        let id = format!("call_{}", &Uuid::new_v4().simple().to_string()[..8]);
        let open = OpenCall {
            server_name: server.to_string(),
            tool_name: tool.to_string(),
            arguments,
            started: Instant::now(),
            started_at: Utc::now(),
        };
        self.inner.lock().open.insert(id.clone(), open);
        CallHandle { id }
    }

    /// Seal a call with its outcome.
    ///
    /// Fails loudly when the handle was already sealed or never issued.
    pub fn end_call(
        &self,
        handle: &CallHandle,
        outcome: &ToolOutcome,
    ) -> Result<ToolCallRecord, RecorderError> {
        let mut inner = self.inner.lock();
        let open = match inner.open.remove(&handle.id) {
            Some(open) => open,
            None => {
                if inner.sealed.iter().any(|r| r.id == handle.id) {
                    return Err(RecorderError::HandleAlreadySealed(handle.id.clone()));
                }
                return Err(RecorderError::UnknownHandle(handle.id.clone()));
            }
        };

        let duration_ms = open.started.elapsed().as_millis() as u64;
        let record = ToolCallRecord {
            id: handle.id.clone(),
            server_name: open.server_name,
            tool_name: open.tool_name,
            arguments: open.arguments,
            success: outcome.success,
            result: outcome.data.clone(),
            error: outcome.error.clone(),
            duration_ms,
            started_at: open.started_at,
            // Derived from the monotonic span, not a second clock read.
            ended_at: open.started_at + chrono::Duration::milliseconds(duration_ms as i64),
        };
        tracing::debug!(
            call = %record.id,
            tool = %record.qualified_name(),
            success = record.success,
            duration_ms = record.duration_ms,
            "tool call sealed"
        );
        inner.sealed.push_back(record.clone());
        while inner.sealed.len() > self.max_records {
            inner.sealed.pop_front();
        }
        Ok(record)
    }

    /// Number of calls opened but not yet sealed.
    pub fn open_calls(&self) -> usize {
        self.inner.lock().open.len()
    }

    /// Snapshot of the sealed records, oldest first.
    pub fn records(&self) -> Vec<ToolCallRecord> {
        self.inner.lock().sealed.iter().cloned().collect()
    }

    /// Aggregate statistics over the sealed records.
    pub fn stats(&self) -> RecorderStats {
        compute_stats(&self.records())
    }

    /// Stats plus records as one payload.
    pub fn report(&self) -> RecorderReport {
        let records = self.records();
        RecorderReport {
            generated_at: Utc::now(),
            stats: compute_stats(&records),
            records,
        }
    }

    /// Pretty-printed JSON export of the full report.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.report())
    }

    /// Markdown export: summary plus a per-tool table.
    pub fn export_markdown(&self) -> String {
        let report = self.report();
        let stats = &report.stats;

        let mut out = String::new();
        out.push_str("# Tool Call Report\n\n");
        out.push_str(&format!(
            "Generated: {}\n\n",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str("## Summary\n\n");
        out.push_str(&format!("- Total calls: {}\n", stats.total_calls));
        out.push_str(&format!("- Successes: {}\n", stats.successes));
        out.push_str(&format!("- Failures: {}\n", stats.failures));
        out.push_str(&format!(
            "- Error rate: {:.1}%\n",
            stats.error_rate * 100.0
        ));
        out.push_str(&format!(
            "- Mean duration: {:.1}ms\n",
            stats.mean_duration_ms
        ));
        out.push_str(&format!(
            "- p50 / p95 duration: {}ms / {}ms\n",
            stats.p50_duration_ms, stats.p95_duration_ms
        ));

        if !stats.per_tool.is_empty() {
            out.push_str("\n## Per-tool\n\n");
            out.push_str("| Tool | Calls | Successes | Failures | Mean (ms) |\n");
            out.push_str("|------|------:|----------:|---------:|----------:|\n");
            for (name, tool) in &stats.per_tool {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {:.1} |\n",
                    name, tool.calls, tool.successes, tool.failures, tool.mean_duration_ms
                ));
            }
        }
        out
    }
}

fn compute_stats(records: &[ToolCallRecord]) -> RecorderStats {
    let total = records.len();
    let successes = records.iter().filter(|r| r.success).count();
    let failures = total - successes;

    let mut durations: Vec<u64> = records.iter().map(|r| r.duration_ms).collect();
    durations.sort_unstable();
    let mean = if total == 0 {
        0.0
    } else {
        durations.iter().sum::<u64>() as f64 / total as f64
    };

    let mut per_tool: BTreeMap<String, ToolStats> = BTreeMap::new();
    for record in records {
        let entry = per_tool.entry(record.qualified_name()).or_default();
        entry.calls += 1;
        if record.success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
        }
        // Accumulate the sum; divided into a mean below.
        entry.mean_duration_ms += record.duration_ms as f64;
    }
    for tool in per_tool.values_mut() {
        if tool.calls > 0 {
            tool.mean_duration_ms /= tool.calls as f64;
        }
    }

    RecorderStats {
        total_calls: total,
        successes,
        failures,
        error_rate: if total == 0 {
            0.0
        } else {
            failures as f64 / total as f64
        },
        mean_duration_ms: mean,
        p50_duration_ms: percentile(&durations, 0.50),
        p95_duration_ms: percentile(&durations, 0.95),
        per_tool,
    }
}

/// Nearest-rank percentile over an ascending-sorted slice.
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (q * sorted.len() as f64).ceil().max(1.0) as usize;
    sorted[rank - 1]
}
