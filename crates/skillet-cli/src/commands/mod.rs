//! CLI command implementations.

pub mod mcp;
pub mod print;
pub mod skills;
