//! # skillet-llm
//!
//! LLM access for Skillet.
//!
//! This crate provides:
//! - The `LlmClient` trait the planner and reasoner depend on
//! - An OpenAI-compatible implementation (Ollama works out of the box)
//! - Chat request builders

pub mod chat;
pub mod client;
pub mod error;

pub use chat::{ChatMessage, ChatRequest};
pub use client::{LlmClient, OpenAiCompatClient};
pub use error::LlmError;
