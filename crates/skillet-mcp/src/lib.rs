//! # skillet-mcp
//!
//! MCP (Model Context Protocol) client integration for Skillet.
//!
//! This crate provides:
//! - Per-server sessions with request/response correlation
//! - stdio, SSE and HTTP transport support
//! - Tool discovery, a sealed startup registry and argument validation
//! - A multi-server manager with structured call outcomes

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sse;
pub mod transport;
pub mod validate;

pub use client::{InitReport, McpClientManager, ServerStatus};
pub use config::{load_server_configs, McpServerConfig};
pub use error::{McpError, TransportError};
pub use registry::ToolRegistry;
pub use session::{ConnectionState, McpSession};
pub use transport::TransportKind;
