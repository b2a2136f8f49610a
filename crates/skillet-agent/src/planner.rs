//! Query planning: keyword pass first, LLM classification second.
//!
//! The cheap deterministic pass runs on every query. Only when no skill
//! clears the confidence threshold does the planner spend one bounded
//! LLM call on classification, and every way that call can go wrong
//! (timeout, API failure, unparseable reply, unknown skill names) lands
//! on the same fallback plan. Planning therefore degrades, it does not
//! fail, except when the fallback skill itself is missing.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use skillet_core::{Error, Plan, PlanSource, PlanStep, PlannerConfig};
use skillet_llm::{ChatRequest, LlmClient};
use skillet_skills::SkillRegistry;

use crate::selector::{SkillScore, SkillSelector};

/// Sampling temperature for the classification call. Low, because the
/// reply must be machine-parseable JSON, not prose.
const CLASSIFY_TEMPERATURE: f32 = 0.3;

/// Plan shape the classification LLM is asked to produce.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    skill: String,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// Turns a query into a [`Plan`].
pub struct Planner {
    registry: Arc<SkillRegistry>,
    selector: SkillSelector,
    llm: Arc<dyn LlmClient>,
    config: PlannerConfig,
}

impl Planner {
    /// Create a planner over a registry and an LLM endpoint.
    pub fn new(
        registry: Arc<SkillRegistry>,
        llm: Arc<dyn LlmClient>,
        config: PlannerConfig,
    ) -> Self {
        let selector = SkillSelector::new(Arc::clone(&registry));
        Self {
            registry,
            selector,
            llm,
            config,
        }
    }

    /// Plan one query. `context` is the session's conversation summary,
    /// possibly empty.
    pub async fn plan(&self, query: &str, context: &str) -> Result<Plan, Error> {
        let best = self.selector.best(query);

        if let Some(score) = &best {
            if score.confidence >= self.config.confidence_threshold {
                if let Some(plan) = self.keyword_plan(query, score) {
                    info!(
                        skill = %score.name,
                        confidence = score.confidence,
                        steps = plan.len(),
                        "Keyword pass selected a skill"
                    );
                    return Ok(plan);
                }
            }
        }

        let confidence = best.map(|s| s.confidence).unwrap_or(0.0);
        match timeout(self.config.llm_timeout(), self.classify(query, context, confidence)).await {
            Ok(Ok(Some(plan))) => {
                info!(steps = plan.len(), skills = ?plan.skill_names(), "LLM classification produced a plan");
                Ok(plan)
            }
            Ok(Ok(None)) => {
                warn!("LLM reply held no usable plan, using fallback");
                self.fallback_plan()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "LLM classification failed, using fallback");
                self.fallback_plan()
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.llm_timeout_secs,
                    "LLM classification timed out, using fallback"
                );
                self.fallback_plan()
            }
        }
    }

    /// The no-skill plan targeting the configured fallback skill.
    ///
    /// The only unrecoverable planning error: a deployment whose
    /// fallback skill is not registered cannot answer unmatched queries
    /// at all.
    pub fn fallback_plan(&self) -> Result<Plan, Error> {
        if !self.registry.contains(&self.config.fallback_skill) {
            return Err(Error::PlanningFallback(format!(
                "fallback skill '{}' is not registered",
                self.config.fallback_skill
            )));
        }
        Ok(Plan::fallback(self.config.fallback_skill.as_str()))
    }

    /// Build the direct plan for a keyword winner: auxiliary steps for
    /// its declared dependencies first, then the skill itself.
    fn keyword_plan(&self, query: &str, score: &SkillScore) -> Option<Plan> {
        let skill = self.registry.get(&score.name)?;
        let descriptor = skill.descriptor();

        let mut steps = Vec::with_capacity(descriptor.dependencies.len() + 1);
        let mut primary = PlanStep::new(&score.name).with_args(skill.extract_args(query));

        for dependency in &descriptor.dependencies {
            match self.registry.get(dependency) {
                Some(aux) => {
                    steps.push(PlanStep::new(dependency.clone()).with_args(aux.extract_args(query)));
                    primary = primary.with_dependency(dependency.clone());
                }
                None => warn!(
                    skill = %score.name,
                    dependency = %dependency,
                    "Declared dependency is not registered, skipping"
                ),
            }
        }

        steps.push(primary);
        Some(Plan::new(steps, PlanSource::Keyword, score.confidence))
    }

    /// One LLM classification call. `confidence` is the sub-threshold
    /// keyword best, kept on the plan for debugging.
    async fn classify(
        &self,
        query: &str,
        context: &str,
        confidence: f64,
    ) -> Result<Option<Plan>, Error> {
        let request = ChatRequest::new()
            .with_system(self.system_prompt())
            .with_user(Self::user_prompt(query, context))
            .with_temperature(CLASSIFY_TEMPERATURE);

        let reply = self.llm.chat(request).await.map_err(Error::from)?;
        debug!(reply_chars = reply.chars().count(), "Classification reply received");
        Ok(self.plan_from_reply(query, &reply, confidence))
    }

    fn system_prompt(&self) -> String {
        let catalog = self
            .registry
            .descriptors()
            .iter()
            .map(|d| format!("- **{}**: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "你是任务规划助手。根据用户请求，从可用技能中选出要执行的技能，并输出执行计划。\n\
             \n\
             ## 可用技能\n\
             {catalog}\n\
             \n\
             ## 输出格式\n\
             只输出一个 JSON 对象，不要附加解释：\n\
             \n\
             ```json\n\
             {{\"steps\": [{{\"skill\": \"技能名\", \"args\": {{}}, \"depends_on\": []}}]}}\n\
             ```\n\
             \n\
             ## 规划原则\n\
             1. 只使用上面列出的技能名\n\
             2. 能一步完成就不要拆成多步\n\
             3. 某步需要引用前面步骤的结果时，把前面步骤的技能名写进它的 depends_on\n\
             4. 没有合适技能时，用 {fallback} 直接回答",
            fallback = self.config.fallback_skill,
        )
    }

    fn user_prompt(query: &str, context: &str) -> String {
        let context = if context.is_empty() { "（无）" } else { context };
        format!("## 对话上下文\n{context}\n\n## 用户请求\n{query}")
    }

    /// Parse the classification reply into a plan.
    ///
    /// Skill names are resolved through the registry's fuzzy lookup;
    /// any name that still resolves to nothing rejects the whole reply.
    /// Steps without arguments get the skill's own extraction as a
    /// second chance.
    fn plan_from_reply(&self, query: &str, reply: &str, confidence: f64) -> Option<Plan> {
        let raw: RawPlan = serde_json::from_str(extract_json(reply)).ok()?;
        if raw.steps.is_empty() {
            return None;
        }

        let mut steps = Vec::with_capacity(raw.steps.len());
        for raw_step in raw.steps {
            let skill = self.registry.resolve(&raw_step.skill)?;
            let name = skill.descriptor().name;
            let args = if raw_step.args.is_empty() {
                skill.extract_args(query)
            } else {
                raw_step.args
            };
            let depends_on = raw_step
                .depends_on
                .iter()
                .filter_map(|dep| self.registry.resolve(dep).map(|s| s.descriptor().name))
                .collect();

            steps.push(PlanStep {
                skill: name,
                args,
                depends_on,
            });
        }

        Some(Plan::new(steps, PlanSource::Llm, confidence))
    }
}

/// Strip a Markdown code fence if the reply carries one.
fn extract_json(reply: &str) -> &str {
    if let Some(start) = reply.find("```json") {
        let rest = &reply[start + 7..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    if let Some(start) = reply.find("```") {
        let rest = &reply[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    reply.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;

    use skillet_core::ErrorKind;
    use skillet_llm::LlmError;
    use skillet_skills::builtin::{DirectAnswerSkill, TravelSkill, WeatherSkill};
    use skillet_skills::testing::ScriptedLlm;
    use skillet_skills::{Skill, SkillContext, SkillDescriptor, SkillOutput};

    struct HangingLlm;

    #[async_trait]
    impl LlmClient for HangingLlm {
        fn model(&self) -> &str {
            "hanging"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    struct PreparedSkill {
        descriptor: SkillDescriptor,
    }

    #[async_trait]
    impl Skill for PreparedSkill {
        fn descriptor(&self) -> SkillDescriptor {
            self.descriptor.clone()
        }

        async fn execute(
            &self,
            _query: &str,
            _args: &Map<String, Value>,
            _ctx: &SkillContext,
        ) -> Result<SkillOutput, Error> {
            Ok(SkillOutput::text("prepared"))
        }
    }

    fn standard_registry() -> Arc<SkillRegistry> {
        Arc::new(
            SkillRegistry::builder()
                .register(Arc::new(WeatherSkill::new()))
                .register(Arc::new(TravelSkill::new()))
                .register(Arc::new(DirectAnswerSkill::new()))
                .build()
                .unwrap(),
        )
    }

    fn planner(registry: Arc<SkillRegistry>, llm: Arc<dyn LlmClient>) -> Planner {
        Planner::new(registry, llm, PlannerConfig::default())
    }

    #[tokio::test]
    async fn test_keyword_pass_plans_without_llm() {
        let llm = Arc::new(ScriptedLlm::reply("never used"));
        let planner = planner(standard_registry(), llm.clone());

        let plan = planner.plan("北京今天天气怎么样？", "").await.unwrap();

        assert_eq!(plan.source, PlanSource::Keyword);
        assert_eq!(plan.confidence, 0.9);
        assert_eq!(plan.skill_names(), vec!["weather"]);
        assert_eq!(plan.steps[0].args.get("city"), Some(&serde_json::json!("北京")));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_dependencies_become_leading_steps() {
        let primary = PreparedSkill {
            descriptor: SkillDescriptor::new("report", "汇报")
                .with_keywords(["汇报"])
                .with_dependency("prep"),
        };
        let aux = PreparedSkill {
            descriptor: SkillDescriptor::new("prep", "准备"),
        };
        let registry = Arc::new(
            SkillRegistry::builder()
                .register(Arc::new(primary))
                .register(Arc::new(aux))
                .build()
                .unwrap(),
        );
        let planner = planner(registry, Arc::new(ScriptedLlm::reply("never used")));

        let plan = planner.plan("帮我做个汇报", "").await.unwrap();

        assert_eq!(plan.skill_names(), vec!["prep", "report"]);
        assert!(plan.steps[0].depends_on.is_empty());
        assert_eq!(plan.steps[1].depends_on, vec!["prep"]);
    }

    #[tokio::test]
    async fn test_low_confidence_consults_llm() {
        let llm = Arc::new(ScriptedLlm::reply(
            "好的，计划如下：\n```json\n{\"steps\": [{\"skill\": \"weather\", \"args\": {\"city\": \"上海\"}, \"depends_on\": []}]}\n```",
        ));
        let planner = planner(standard_registry(), llm.clone());

        // No skill keyword appears in the query.
        let plan = planner.plan("帮我看看上海那边的情况", "").await.unwrap();

        assert_eq!(plan.source, PlanSource::Llm);
        assert_eq!(plan.skill_names(), vec!["weather"]);
        assert_eq!(plan.steps[0].args.get("city"), Some(&serde_json::json!("上海")));
        assert_eq!(llm.requests().len(), 1);
        // The catalog and the query both reached the model.
        let prompt = llm.last_prompt();
        assert!(prompt.contains("**weather**"));
        assert!(prompt.contains("上海那边的情况"));
    }

    #[tokio::test]
    async fn test_bare_json_reply_and_missing_args() {
        // No fence, no args: extraction falls back to the skill's own.
        let llm = Arc::new(ScriptedLlm::reply(
            "{\"steps\": [{\"skill\": \"weather\"}]}",
        ));
        let planner = planner(standard_registry(), llm);

        let plan = planner.plan("北京那边现在如何", "").await.unwrap();

        assert_eq!(plan.source, PlanSource::Llm);
        assert_eq!(plan.steps[0].args.get("city"), Some(&serde_json::json!("北京")));
    }

    #[tokio::test]
    async fn test_unknown_skill_in_reply_falls_back() {
        let llm = Arc::new(ScriptedLlm::reply(
            "```json\n{\"steps\": [{\"skill\": \"teleport\", \"args\": {}, \"depends_on\": []}]}\n```",
        ));
        let planner = planner(standard_registry(), llm);

        let plan = planner.plan("带我去月球", "").await.unwrap();

        assert!(plan.is_fallback());
        assert_eq!(plan.skill_names(), vec!["direct_answer"]);
        assert_eq!(plan.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_unparseable_reply_falls_back() {
        let llm = Arc::new(ScriptedLlm::reply("这个问题我需要想想。"));
        let planner = planner(standard_registry(), llm);

        let plan = planner.plan("呵呵", "").await.unwrap();
        assert!(plan.is_fallback());
    }

    #[tokio::test]
    async fn test_llm_failure_falls_back() {
        let llm = Arc::new(ScriptedLlm::failing("model overloaded"));
        let planner = planner(standard_registry(), llm);

        let plan = planner.plan("呵呵", "").await.unwrap();
        assert!(plan.is_fallback());
    }

    #[tokio::test]
    async fn test_llm_timeout_falls_back() {
        let config = PlannerConfig {
            llm_timeout_secs: 1,
            ..PlannerConfig::default()
        };
        let planner = Planner::new(standard_registry(), Arc::new(HangingLlm), config);

        let plan = planner.plan("呵呵", "").await.unwrap();
        assert!(plan.is_fallback());
    }

    #[tokio::test]
    async fn test_missing_fallback_skill_is_unrecoverable() {
        let registry = Arc::new(
            SkillRegistry::builder()
                .register(Arc::new(WeatherSkill::new()))
                .build()
                .unwrap(),
        );
        let planner = planner(registry, Arc::new(ScriptedLlm::failing("down")));

        let err = planner.plan("呵呵", "").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PlanningFallback);
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(
            extract_json("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
        assert_eq!(extract_json("前言\n```\n{\"a\": 1}\n```\n后记"), "{\"a\": 1}");
        assert_eq!(extract_json("  {\"a\": 1}  "), "{\"a\": 1}");
    }
}
