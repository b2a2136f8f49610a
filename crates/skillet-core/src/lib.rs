//! # skillet-core
//!
//! Core types and configuration for the Skillet pipeline:
//!
//! - Error taxonomy shared by every crate
//! - Conversation turns stored in session memory
//! - Plans produced by the planner and consumed by the executor
//! - Tool descriptors and call outcomes
//! - Application configuration

pub mod config;
pub mod error;
pub mod message;
pub mod plan;
pub mod tool;

pub use config::{
    Config, ExecutorConfig, LlmConfig, MemoryConfig, PlannerConfig, RecorderConfig, RunConfig,
};
pub use error::{Error, ErrorKind, Result};
pub use message::{ConversationTurn, Role};
pub use plan::{Plan, PlanSource, PlanStep};
pub use tool::{ErrorDetail, ToolDescriptor, ToolOutcome};
