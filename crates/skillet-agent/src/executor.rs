//! Plan execution.
//!
//! Runs a plan's steps strictly in order, narrowing each step's view of
//! earlier results to its declared dependencies. A failed step
//! short-circuits the rest of the plan unless partial failure is
//! allowed; either way the executor itself never fails, it reports.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, warn};

use skillet_core::{Error, ErrorDetail, ExecutorConfig, Plan, PlanStep};
use skillet_skills::{SkillContext, SkillOutput, SkillRegistry};
use skillet_trace::TraceEventType;

/// What one plan step produced.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// Position of the step in the plan.
    pub index: usize,
    /// Skill that ran.
    pub skill: String,
    /// Whether the step succeeded.
    pub success: bool,
    /// The skill's output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<SkillOutput>,
    /// Structured error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Wall-clock duration of the step in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of executing one plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    /// Results of the steps that ran, in plan order.
    pub steps: Vec<StepResult>,
    /// Whether a failure cut the plan short.
    pub aborted: bool,
}

impl ExecutionReport {
    /// Whether every planned step ran and succeeded.
    pub fn completed(&self) -> bool {
        !self.aborted && self.steps.iter().all(|s| s.success)
    }

    /// Successful outputs keyed by skill name. A skill that ran twice
    /// keeps its latest output.
    pub fn outputs(&self) -> BTreeMap<String, SkillOutput> {
        self.steps
            .iter()
            .filter_map(|s| s.output.as_ref().map(|o| (s.skill.clone(), o.clone())))
            .collect()
    }

    /// Whether any step produced an output worth synthesizing.
    pub fn has_output(&self) -> bool {
        self.steps.iter().any(|s| s.success)
    }

    /// The first failed step, if any.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }
}

/// Runs plans against the skill registry.
pub struct Executor {
    registry: Arc<SkillRegistry>,
    config: ExecutorConfig,
}

impl Executor {
    /// Create an executor over a registry.
    pub fn new(registry: Arc<SkillRegistry>, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Execute a plan. `base` is the run's context; each step gets a
    /// copy narrowed to the outputs of its declared dependencies.
    pub async fn execute(&self, query: &str, plan: &Plan, base: &SkillContext) -> ExecutionReport {
        let mut report = ExecutionReport {
            steps: Vec::with_capacity(plan.len()),
            aborted: false,
        };
        let mut outputs: BTreeMap<String, SkillOutput> = BTreeMap::new();

        for (index, step) in plan.steps.iter().enumerate() {
            base.tracer().record(
                TraceEventType::SkillSelected,
                json!({"step": index, "skill": step.skill}),
            );

            let narrowed = step
                .depends_on
                .iter()
                .filter_map(|dep| outputs.get(dep).map(|o| (dep.clone(), o.clone())))
                .collect();
            let step_ctx = base.clone().with_prior_outputs(narrowed);

            let started = Instant::now();
            let result = self.run_step(query, step, &step_ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    debug!(step = index, skill = %step.skill, duration_ms, "Step completed");
                    outputs.insert(step.skill.clone(), output.clone());
                    report.steps.push(StepResult {
                        index,
                        skill: step.skill.clone(),
                        success: true,
                        output: Some(output),
                        error: None,
                        duration_ms,
                    });
                }
                Err(e) => {
                    warn!(step = index, skill = %step.skill, error = %e, "Step failed");
                    report.steps.push(StepResult {
                        index,
                        skill: step.skill.clone(),
                        success: false,
                        output: None,
                        error: Some(ErrorDetail::from(&e)),
                        duration_ms,
                    });
                    if !self.config.allow_partial_failure {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        report
    }

    async fn run_step(
        &self,
        query: &str,
        step: &PlanStep,
        ctx: &SkillContext,
    ) -> Result<SkillOutput, Error> {
        let skill = self
            .registry
            .resolve(&step.skill)
            .ok_or_else(|| Error::validation(format!("unknown skill '{}'", step.skill)))?;

        match self.config.step_timeout() {
            Some(limit) => match timeout(limit, skill.execute(query, &step.args, ctx)).await {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!(
                    "step '{}' exceeded {}s",
                    step.skill, self.config.step_timeout_secs
                ))),
            },
            None => skill.execute(query, &step.args, ctx).await,
        }
    }
}
