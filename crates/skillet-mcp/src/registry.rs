//! Write-once registry of tools discovered at startup.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use tracing::debug;

use skillet_core::ToolDescriptor;

use crate::error::McpError;
use crate::protocol::ToolInfo;

/// Index of every tool discovered during the startup pass, keyed by
/// server then tool name.
///
/// The registry is sealed exactly once after discovery; afterwards it
/// is immutable, so lookups never race connection churn. Tools on
/// servers that connect later are resolved against their session's
/// live cache instead.
#[derive(Default)]
pub struct ToolRegistry {
    tools: OnceCell<HashMap<String, HashMap<String, ToolDescriptor>>>,
}

impl ToolRegistry {
    /// Create an unsealed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal the registry with per-server tool listings. Callable once;
    /// a second seal is an error.
    pub fn seal(&self, listings: Vec<(String, Vec<ToolInfo>)>) -> Result<(), McpError> {
        let mut map: HashMap<String, HashMap<String, ToolDescriptor>> = HashMap::new();
        let mut total = 0usize;

        for (server, tools) in listings {
            let entry = map.entry(server.clone()).or_default();
            for info in tools {
                total += 1;
                entry.insert(info.name.clone(), descriptor_from_info(&server, &info));
            }
        }

        debug!(
            servers = map.len(),
            tools = total,
            "Sealing tool registry"
        );

        self.tools.set(map).map_err(|_| McpError::RegistrySealed)
    }

    /// Whether the registry has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.tools.get().is_some()
    }

    /// Look up one tool. Returns `None` before sealing.
    pub fn get(&self, server: &str, tool: &str) -> Option<&ToolDescriptor> {
        self.tools.get()?.get(server)?.get(tool)
    }

    /// All tools on one server, sorted by name.
    pub fn for_server(&self, server: &str) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<_> = self
            .tools
            .get()
            .and_then(|m| m.get(server))
            .map(|m| m.values().collect())
            .unwrap_or_default();
        tools.sort_by(|a: &&ToolDescriptor, b: &&ToolDescriptor| a.name.cmp(&b.name));
        tools
    }

    /// All registered tools, sorted by qualified name.
    pub fn all(&self) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<_> = self
            .tools
            .get()
            .map(|m| m.values().flat_map(|s| s.values()).collect())
            .unwrap_or_default();
        tools.sort_by_key(|t: &&ToolDescriptor| t.qualified_name());
        tools
    }

    /// Names of servers that registered at least one tool.
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .tools
            .get()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Total number of registered tools.
    pub fn len(&self) -> usize {
        self.tools
            .get()
            .map(|m| m.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    /// Whether the registry holds no tools.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convert a wire-level tool listing into a registry descriptor.
pub fn descriptor_from_info(server: &str, info: &ToolInfo) -> ToolDescriptor {
    ToolDescriptor {
        name: info.name.clone(),
        description: info.description.clone().unwrap_or_default(),
        parameter_schema: info.input_schema.clone(),
        server_name: server.to_string(),
    }
}
