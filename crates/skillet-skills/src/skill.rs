//! The skill interface.
//!
//! A skill is a business-logic unit that interprets a query and
//! optionally invokes tools to produce a result. Skills carry a static
//! descriptor for planning and implement a fixed trait surface; no
//! dynamic registration, no duck typing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use skillet_core::Error;

use crate::context::SkillContext;
use crate::score;

/// Static description of a skill, used by the planner and selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDescriptor {
    /// Unique skill name.
    pub name: String,
    /// Human-readable description, shown to the planning LLM.
    pub description: String,
    /// Substrings whose presence in a query scores a keyword match.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex sources scored as pattern matches.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Tie-breaker between skills at equal confidence; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Capability tags, for display and catalog filtering.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Names of auxiliary skills the planner schedules before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl SkillDescriptor {
    /// Create a descriptor with the given name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            keywords: Vec::new(),
            patterns: Vec::new(),
            priority: 0,
            capabilities: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Replace the keyword set.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Add one regex pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Set the tie-break priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add one capability tag.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Declare an auxiliary skill scheduled before this one.
    pub fn with_dependency(mut self, skill: impl Into<String>) -> Self {
        self.dependencies.push(skill.into());
        self
    }
}

/// What one skill execution produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillOutput {
    /// Natural-language summary of the result.
    pub summary: String,
    /// Structured payload backing the summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Qualified `server/tool` names (or other provenance) behind the result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl SkillOutput {
    /// Create a text-only output.
    pub fn text(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            data: None,
            sources: Vec::new(),
        }
    }

    /// Attach the structured payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Record one provenance entry.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }
}

/// A skill the planner can schedule and the executor can run.
///
/// `can_handle` and `extract_args` are pure over the query so selection
/// stays deterministic and unit-testable; all I/O happens in `execute`
/// through the [`SkillContext`].
#[async_trait]
pub trait Skill: Send + Sync {
    /// The skill's static descriptor.
    fn descriptor(&self) -> SkillDescriptor;

    /// Confidence in `[0, 1]` that this skill should handle the query.
    fn can_handle(&self, query: &str) -> f64 {
        score::keyword_confidence(&self.descriptor(), query)
    }

    /// Extract call arguments from the query at planning time.
    fn extract_args(&self, _query: &str) -> Map<String, Value> {
        Map::new()
    }

    /// Run the skill.
    ///
    /// `args` are the planner-extracted arguments for this step. A
    /// failed tool call should degrade to an `Err` carrying enough
    /// detail for the reasoner's failure reply, never panic.
    async fn execute(
        &self,
        query: &str,
        args: &Map<String, Value>,
        ctx: &SkillContext,
    ) -> Result<SkillOutput, Error>;
}
