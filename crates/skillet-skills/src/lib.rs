//! # skillet-skills
//!
//! The skill layer of the Skillet pipeline.
//!
//! This crate provides:
//! - The `Skill` trait and static `SkillDescriptor` metadata
//! - `SkillContext`, the execution context carrying tool access, the
//!   LLM, tracing and call recording into each skill
//! - Deterministic keyword/pattern confidence scoring
//! - The immutable-after-build `SkillRegistry`
//! - A bounded opt-in retry helper for transient tool failures
//! - The built-in skill catalog (weather, travel, knowledge,
//!   summarize, direct answer)
//! - Scripted test doubles shared with downstream crates

pub mod builtin;
pub mod context;
pub mod registry;
pub mod retry;
pub mod score;
pub mod skill;
pub mod testing;

pub use context::{SkillContext, ToolInvoker};
pub use registry::{SkillRegistry, SkillRegistryBuilder};
pub use retry::with_retries;
pub use skill::{Skill, SkillDescriptor, SkillOutput};
