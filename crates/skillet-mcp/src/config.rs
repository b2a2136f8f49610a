//! MCP server configuration and the servers file loader.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::McpError;
use crate::transport::TransportKind;

/// Default per-request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Unique server name.
    pub name: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Command to execute (stdio only).
    pub command: Option<String>,
    /// Command arguments (stdio only).
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for the child process (stdio only).
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory (stdio only).
    pub working_dir: Option<PathBuf>,
    /// Server URL (sse and http only).
    pub url: Option<String>,
    /// Whether this server is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl McpServerConfig {
    /// Create a stdio server configuration.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            url: None,
            enabled: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Create an SSE server configuration.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Sse,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            url: Some(url.into()),
            enabled: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Create an HTTP server configuration.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Http,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            url: Some(url.into()),
            enabled: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Add arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Set whether the server is enabled.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Per-request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate that the configuration is complete for its transport.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.name.is_empty() {
            return Err(McpError::validation("server name must not be empty"));
        }
        // Names appear in qualified tool names as "server/tool".
        if self.name.contains('/') {
            return Err(McpError::validation(format!(
                "server name '{}' must not contain '/'",
                self.name
            )));
        }
        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().unwrap_or("").is_empty() {
                    return Err(McpError::validation(format!(
                        "stdio server '{}' requires a command",
                        self.name
                    )));
                }
            }
            TransportKind::Sse | TransportKind::Http => {
                if self.url.as_deref().unwrap_or("").is_empty() {
                    return Err(McpError::validation(format!(
                        "{} server '{}' requires a url",
                        self.transport, self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// On-disk shape of the servers file.
#[derive(Debug, Deserialize)]
struct ServersFile {
    /// Server definitions keyed by name. A BTreeMap keeps load order
    /// deterministic.
    #[serde(default)]
    servers: BTreeMap<String, RawServerEntry>,
}

/// One entry under `[servers.<name>]`, before the transport string is
/// parsed.
#[derive(Debug, Deserialize)]
struct RawServerEntry {
    #[serde(default = "default_raw_transport")]
    transport: String,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    url: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_raw_transport() -> String {
    "stdio".to_string()
}

/// Load server configurations from a TOML file.
///
/// A missing file yields an empty list so the agent can run without any
/// servers configured. Entries naming a transport this build does not
/// know are skipped with a warning; entries missing required fields are
/// an error.
pub fn load_server_configs(path: impl AsRef<Path>) -> Result<Vec<McpServerConfig>, McpError> {
    let path = path.as_ref();

    if !path.exists() {
        warn!(path = %path.display(), "Servers file not found, starting with no MCP servers");
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        McpError::validation(format!("failed to read {}: {}", path.display(), e))
    })?;

    parse_server_configs(&contents)
        .map_err(|e| McpError::validation(format!("in {}: {}", path.display(), e)))
}

fn parse_server_configs(contents: &str) -> Result<Vec<McpServerConfig>, McpError> {
    let file: ServersFile = toml::from_str(contents)
        .map_err(|e| McpError::validation(format!("invalid servers file: {}", e)))?;

    let mut configs = Vec::new();

    for (name, raw) in file.servers {
        if !raw.enabled {
            debug!(server = %name, "Skipping disabled server");
            continue;
        }

        let transport: TransportKind = match raw.transport.parse() {
            Ok(kind) => kind,
            Err(_) => {
                warn!(
                    server = %name,
                    transport = %raw.transport,
                    "Skipping server with unknown transport"
                );
                continue;
            }
        };

        let config = McpServerConfig {
            name,
            transport,
            command: raw.command,
            args: raw.args,
            env: raw.env,
            working_dir: raw.working_dir,
            url: raw.url,
            enabled: true,
            request_timeout_secs: raw.request_timeout_secs,
        };
        config.validate()?;
        configs.push(config);
    }

    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_builder() {
        let config = McpServerConfig::stdio("test", "npx")
            .with_args(vec!["-y".to_string(), "12306-mcp".to_string()])
            .with_env("NODE_ENV", "production")
            .with_timeout_secs(45);

        assert_eq!(config.name, "test");
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.command.as_deref(), Some("npx"));
        assert_eq!(config.args.len(), 2);
        assert_eq!(config.env.get("NODE_ENV"), Some(&"production".to_string()));
        assert_eq!(config.request_timeout(), Duration::from_secs(45));
        assert!(config.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_incomplete_configs() {
        let config = McpServerConfig {
            command: None,
            ..McpServerConfig::stdio("weather", "cmd")
        };
        assert!(config.validate().is_err());

        let config = McpServerConfig {
            url: None,
            ..McpServerConfig::sse("weather", "http://x")
        };
        assert!(config.validate().is_err());

        let config = McpServerConfig::stdio("bad/name", "cmd");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_servers_file() {
        let toml = r#"
            [servers.amap-maps]
            transport = "sse"
            url = "https://mcp.example.com/sse"

            [servers.12306-mcp]
            transport = "stdio"
            command = "npx"
            args = ["-y", "12306-mcp"]
            request_timeout_secs = 45
        "#;

        let configs = parse_server_configs(toml).unwrap();
        assert_eq!(configs.len(), 2);

        // BTreeMap ordering: "12306-mcp" sorts before "amap-maps".
        assert_eq!(configs[0].name, "12306-mcp");
        assert_eq!(configs[0].transport, TransportKind::Stdio);
        assert_eq!(configs[0].request_timeout_secs, 45);

        assert_eq!(configs[1].name, "amap-maps");
        assert_eq!(configs[1].transport, TransportKind::Sse);
        assert_eq!(configs[1].request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_skips_disabled_and_unknown_transports() {
        let toml = r#"
            [servers.off]
            command = "noop"
            enabled = false

            [servers.future]
            transport = "websocket"
            url = "ws://example.com"

            [servers.ok]
            command = "npx"
        "#;

        let configs = parse_server_configs(toml).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "ok");
    }

    #[test]
    fn test_parse_rejects_missing_required_fields() {
        let toml = r#"
            [servers.broken]
            transport = "sse"
        "#;
        assert!(parse_server_configs(toml).is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let configs = load_server_configs("/nonexistent/servers.toml").unwrap();
        assert!(configs.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.toml");
        std::fs::write(
            &path,
            r#"
            [servers.echo]
            command = "cat"
            "#,
        )
        .unwrap();

        let configs = load_server_configs(&path).unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].name, "echo");
        assert_eq!(configs[0].transport, TransportKind::Stdio);
    }
}
