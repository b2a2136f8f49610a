//! # skillet-trace
//!
//! Observability for orchestration runs:
//!
//! - **Tracer**: per-run event timeline with monotonic offsets and
//!   scope guards that cannot leak an unmatched start event.
//! - **ToolRecorder**: bounded audit log of tool calls with aggregate
//!   statistics and JSON/Markdown exports.
//!
//! Both types are cheap to share behind an `Arc` and never block the
//! pipeline on I/O.

pub mod recorder;
pub mod tracer;

pub use recorder::{
    CallHandle, RecorderError, RecorderReport, RecorderStats, ToolCallRecord, ToolRecorder,
    ToolStats,
};
pub use tracer::{TraceEvent, TraceEventType, TraceReport, TraceScope, Tracer};
