//! Question answering grounded in accumulated context.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use skillet_core::Error;
use skillet_llm::ChatRequest;

use crate::context::SkillContext;
use crate::skill::{Skill, SkillDescriptor, SkillOutput};

/// Answers explanatory questions, citing conversation history and prior
/// step outputs as reference material when any exist.
pub struct KnowledgeSkill {
    descriptor: SkillDescriptor,
}

impl KnowledgeSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor::new(
                "knowledge",
                "基于已有上下文和通用知识回答问题。适用于概念解释、信息查询场景。",
            )
            .with_keywords(["什么是", "是什么", "介绍一下", "解释", "what is", "explain"])
            .with_pattern(r"(?i)(what|who|why|how)\s+(is|are|was|does)")
            .with_priority(5)
            .with_capability("question-answering"),
        }
    }

    /// Collect reference sections plus their provenance labels.
    fn reference_sections(ctx: &SkillContext) -> (String, Vec<String>) {
        let mut parts = Vec::new();
        let mut sources = Vec::new();

        if !ctx.memory_summary().is_empty() {
            parts.push(format!("[来源: 对话历史]\n{}", ctx.memory_summary()));
            sources.push("conversation".to_string());
        }
        for (skill, output) in ctx.prior_outputs() {
            parts.push(format!("[来源: {skill}]\n{}", output.summary));
            sources.push(skill.clone());
        }

        (parts.join("\n\n---\n\n"), sources)
    }

    fn grounded_prompt(question: &str, reference: &str) -> String {
        format!(
            "请根据以下参考资料回答问题。如果资料中没有相关信息，请结合通用知识回答并说明。\n\n\
             ## 参考资料\n{reference}\n\n## 问题\n{question}\n\n## 回答"
        )
    }
}

impl Default for KnowledgeSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for KnowledgeSkill {
    fn descriptor(&self) -> SkillDescriptor {
        self.descriptor.clone()
    }

    async fn execute(
        &self,
        query: &str,
        args: &Map<String, Value>,
        ctx: &SkillContext,
    ) -> Result<SkillOutput, Error> {
        let question = args.get("query").and_then(Value::as_str).unwrap_or(query);
        info!("Executing knowledge lookup");

        let (reference, sources) = Self::reference_sections(ctx);
        let prompt = if reference.is_empty() {
            debug!("No reference material, answering from general knowledge");
            question.to_string()
        } else {
            Self::grounded_prompt(question, &reference)
        };

        let reply = ctx
            .chat(ChatRequest::new().with_user(prompt).with_temperature(0.5))
            .await?;

        let mut output = SkillOutput::text(reply);
        for source in sources {
            output = output.with_source(source);
        }
        Ok(output)
    }
}
