//! # skillet-agent
//!
//! The orchestration pipeline: planning, execution, reasoning and
//! per-session memory, tied together by the [`Orchestrator`].
//!
//! ```text
//! Orchestrator
//! ├── Planner (keyword pass + LLM fallback)
//! │   └── SkillSelector (deterministic scoring)
//! ├── Executor (ordered steps, dependency narrowing)
//! ├── Reasoner (synthesis + failure replies)
//! └── MemoryStore (rolling window per session)
//! ```
//!
//! Every run produces a reply, even when planning or execution fails:
//! the reasoner degrades to an apology instead of surfacing raw errors
//! to the user.

pub mod executor;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod reasoner;
pub mod selector;

pub use executor::{ExecutionReport, Executor, StepResult};
pub use memory::{Memory, MemoryStore};
pub use orchestrator::{
    generate_session_id, ChatRequest, ChatResponse, DebugInfo, Orchestrator, OrchestratorBuilder,
};
pub use planner::Planner;
pub use reasoner::Reasoner;
pub use selector::{SkillScore, SkillSelector};
