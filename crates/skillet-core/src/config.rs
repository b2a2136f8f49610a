//! Configuration system for Skillet.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Main configuration struct for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM endpoint settings
    pub llm: LlmConfig,
    /// Planner settings
    pub planner: PlannerConfig,
    /// Executor settings
    pub executor: ExecutorConfig,
    /// Run-level settings
    pub run: RunConfig,
    /// Conversation memory settings
    pub memory: MemoryConfig,
    /// Tool-call recorder settings
    pub recorder: RecorderConfig,
    /// Path to the tool-server configuration file
    pub servers_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            planner: PlannerConfig::default(),
            executor: ExecutorConfig::default(),
            run: RunConfig::default(),
            memory: MemoryConfig::default(),
            recorder: RecorderConfig::default(),
            servers_file: PathBuf::from("servers.toml"),
        }
    }
}

/// LLM endpoint configuration. The endpoint is an opaque collaborator;
/// only its URL, model name and credentials are needed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (Ollama works out of the box)
    pub base_url: String,
    /// Model name
    pub model: String,
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for the API key
    pub api_key_env: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens per completion
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "qwen2.5:7b".to_string(),
            api_key: None,
            api_key_env: Some("SKILLET_LLM_API_KEY".to_string()),
            timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from either the direct value or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        None
    }

    /// Request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Planner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Minimum confidence for the keyword pass to win
    pub confidence_threshold: f64,
    /// Bound on the LLM classification call, in seconds
    pub llm_timeout_secs: u64,
    /// Skill invoked when no skill qualifies
    pub fallback_skill: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            llm_timeout_secs: 20,
            fallback_skill: "direct_answer".to_string(),
        }
    }
}

impl PlannerConfig {
    /// LLM fallback timeout as a Duration.
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Continue past a failed step instead of short-circuiting
    pub allow_partial_failure: bool,
    /// Per-step timeout in seconds (0 disables)
    pub step_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allow_partial_failure: false,
            step_timeout_secs: 60,
        }
    }
}

impl ExecutorConfig {
    /// Per-step timeout, if enabled.
    pub fn step_timeout(&self) -> Option<Duration> {
        if self.step_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.step_timeout_secs))
        }
    }
}

/// Run-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Whole-run timeout in seconds; an expired run still answers the
    /// user with a degraded reply
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl RunConfig {
    /// Run timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Conversation memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Rolling window size in turns
    pub max_turns: usize,
    /// Turns included in the planner/reasoner context summary
    pub summary_turns: usize,
    /// Per-turn truncation in the context summary, in characters
    pub summary_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            summary_turns: 5,
            summary_chars: 200,
        }
    }
}

/// Tool-call recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Sealed records kept before the oldest are dropped
    pub max_records: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { max_records: 1000 }
    }
}

impl Config {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        let config_dir = Self::config_dir();

        Figment::new()
            // Default values
            .merge(figment::providers::Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(config_dir.join("config.toml")))
            // Project config
            .merge(Toml::file("skillet.toml"))
            // Environment variables
            .merge(Env::prefixed("SKILLET_").split("__"))
            .extract()
    }

    /// Load from an explicit file, still honoring environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(figment::providers::Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SKILLET_").split("__"))
            .extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.llm.base_url.is_empty() {
            return Err(Error::config("llm.base_url cannot be empty"));
        }
        if self.llm.model.is_empty() {
            return Err(Error::config("llm.model cannot be empty"));
        }
        if !(0.0..=1.0).contains(&self.planner.confidence_threshold) {
            return Err(Error::config(
                "planner.confidence_threshold must be within [0, 1]",
            ));
        }
        if self.run.timeout_secs == 0 {
            return Err(Error::config("run.timeout_secs must be greater than 0"));
        }
        if self.memory.max_turns == 0 {
            return Err(Error::config("memory.max_turns must be greater than 0"));
        }
        if self.recorder.max_records == 0 {
            return Err(Error::config("recorder.max_records must be greater than 0"));
        }
        Ok(())
    }

    /// User configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skillet")
    }
}
