//! Plans: the ordered skill invocations chosen for one query.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How the plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    /// Keyword/regex match cleared the confidence threshold.
    Keyword,
    /// LLM classification produced the plan.
    Llm,
    /// No skill qualified; the plan targets the default skill.
    Fallback,
}

impl std::fmt::Display for PlanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Llm => write!(f, "llm"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// One skill invocation within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Name of the skill to invoke
    pub skill: String,
    /// Arguments extracted for the skill
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Names of earlier steps whose outputs this step consumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    /// Create a step with no arguments.
    pub fn new(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            args: Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Add one argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Replace the full argument map.
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Declare a dependency on an earlier step's output.
    pub fn with_dependency(mut self, skill: impl Into<String>) -> Self {
        self.depends_on.push(skill.into());
        self
    }
}

/// The ordered sequence of skill invocations for one query.
///
/// Produced once by the planner, consumed once by the executor, never
/// mutated in between. A plan is never empty: the no-skill case is an
/// explicit fallback plan targeting the default skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Steps in execution order
    pub steps: Vec<PlanStep>,
    /// How the plan was produced
    pub source: PlanSource,
    /// Winning confidence at selection time (0.0 for fallback plans)
    pub confidence: f64,
}

impl Plan {
    /// Create a plan from ordered steps.
    pub fn new(steps: Vec<PlanStep>, source: PlanSource, confidence: f64) -> Self {
        Self {
            steps,
            source,
            confidence,
        }
    }

    /// Create a single-step plan.
    pub fn single(step: PlanStep, source: PlanSource, confidence: f64) -> Self {
        Self::new(vec![step], source, confidence)
    }

    /// Create the fallback plan targeting the given default skill.
    pub fn fallback(default_skill: impl Into<String>) -> Self {
        Self::new(vec![PlanStep::new(default_skill)], PlanSource::Fallback, 0.0)
    }

    /// Whether this is the no-skill fallback.
    pub fn is_fallback(&self) -> bool {
        self.source == PlanSource::Fallback
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps. Planners never produce this; it can
    /// only appear if a plan was constructed by hand.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the skills in execution order.
    pub fn skill_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.skill.as_str()).collect()
    }
}
