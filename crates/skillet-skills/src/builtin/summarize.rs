//! Multi-source result consolidation.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use skillet_core::Error;
use skillet_llm::ChatRequest;

use crate::context::SkillContext;
use crate::skill::{Skill, SkillDescriptor, SkillOutput};

const MAX_KEY_POINTS: usize = 5;

/// One piece of information waiting to be merged.
#[derive(Debug, Clone)]
struct SourceInput {
    source: String,
    content: String,
}

/// Merges prior step outputs (or caller-supplied inputs) into one
/// coherent summary. Degrades to a plain concatenation when the model
/// is unavailable; the gathered material is still worth returning.
pub struct SummarizeSkill {
    descriptor: SkillDescriptor,
}

impl SummarizeSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor::new(
                "summarize",
                "整合多个来源的信息，生成结构化摘要。适用于多步骤任务的结果汇总。",
            )
            .with_keywords(["总结", "汇总", "整合", "摘要", "summarize", "summary"])
            .with_priority(5)
            .with_capability("consolidation"),
        }
    }

    /// Gather inputs: explicit `inputs` argument first, then prior step
    /// outputs, then the conversation itself as a last resort.
    fn collect_inputs(args: &Map<String, Value>, ctx: &SkillContext) -> Vec<SourceInput> {
        let mut inputs = Vec::new();

        if let Some(items) = args.get("inputs").and_then(Value::as_array) {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(content) => inputs.push(SourceInput {
                        source: format!("来源{}", i + 1),
                        content: content.clone(),
                    }),
                    Value::Object(map) => {
                        let content = map
                            .get("content")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        if !content.is_empty() {
                            let source = map
                                .get("source")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| format!("来源{}", i + 1));
                            inputs.push(SourceInput {
                                source,
                                content: content.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        for (skill, output) in ctx.prior_outputs() {
            inputs.push(SourceInput {
                source: skill.clone(),
                content: output.summary.clone(),
            });
        }

        if inputs.is_empty() && !ctx.memory_summary().is_empty() {
            inputs.push(SourceInput {
                source: "对话历史".to_string(),
                content: ctx.memory_summary().to_string(),
            });
        }

        inputs
    }

    fn merge_prompt(query: &str, inputs: &[SourceInput]) -> String {
        let sources_text = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| format!("### 来源 {}: {}\n{}", i + 1, input.source, input.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "请将以下多个信息来源整合为一个清晰、有条理的回答。\n\n\
             ## 原始问题\n{query}\n\n\
             ## 信息来源\n{sources_text}\n\n\
             ## 要求\n\
             - 提取关键信息，去除冗余\n\
             - 保持信息准确性，不添加臆测\n\
             - 如有冲突信息，请说明\n\n\
             请生成整合后的回答："
        )
    }

    /// Merge without a model: label each source and concatenate.
    fn simple_merge(inputs: &[SourceInput]) -> String {
        inputs
            .iter()
            .map(|input| format!("### {}\n\n{}", input.source, input.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Pull markdown list items out of the summary as key points.
    fn extract_key_points(text: &str) -> Vec<String> {
        let Ok(re) = Regex::new(r"^(?:[-*•]|\d+\.)\s+(.+)$") else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|line| {
                re.captures(line.trim())
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .take(MAX_KEY_POINTS)
            .collect()
    }

    fn build_output(summary: String, inputs: &[SourceInput], degraded: bool) -> SkillOutput {
        let key_points = Self::extract_key_points(&summary);
        let data = json!({
            "key_points": key_points,
            "input_count": inputs.len(),
            "degraded": degraded,
        });

        let mut output = SkillOutput::text(summary).with_data(data);
        for input in inputs {
            output = output.with_source(input.source.clone());
        }
        output
    }
}

impl Default for SummarizeSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for SummarizeSkill {
    fn descriptor(&self) -> SkillDescriptor {
        self.descriptor.clone()
    }

    async fn execute(
        &self,
        query: &str,
        args: &Map<String, Value>,
        ctx: &SkillContext,
    ) -> Result<SkillOutput, Error> {
        let inputs = Self::collect_inputs(args, ctx);
        if inputs.is_empty() {
            return Err(Error::skill("没有可整合的信息"));
        }

        info!(input_count = inputs.len(), "Executing summarize");

        let request = ChatRequest::new()
            .with_user(Self::merge_prompt(query, &inputs))
            .with_temperature(0.5);

        match ctx.chat(request).await {
            Ok(summary) => Ok(Self::build_output(summary, &inputs, false)),
            Err(error) => {
                warn!(error = %error, "LLM merge failed, falling back to plain concatenation");
                Ok(Self::build_output(Self::simple_merge(&inputs), &inputs, true))
            }
        }
    }
}
