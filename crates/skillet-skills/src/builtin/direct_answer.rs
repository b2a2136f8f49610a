//! Plain LLM chat without tool calls.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use skillet_core::Error;
use skillet_llm::ChatRequest;

use crate::context::SkillContext;
use crate::skill::{Skill, SkillDescriptor, SkillOutput};

/// Answers the query directly from the model. This is the fallback
/// skill every plan can degrade to, so it carries no keywords and
/// never wins selection on its own.
pub struct DirectAnswerSkill {
    descriptor: SkillDescriptor,
}

impl DirectAnswerSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor::new(
                "direct_answer",
                "直接回答用户问题，不调用外部工具。适用于常识问答、解释说明、闲聊等场景。",
            )
            .with_capability("chat"),
        }
    }

    fn build_prompt(query: &str, ctx: &SkillContext) -> String {
        let mut parts = Vec::new();
        if !ctx.memory_summary().is_empty() {
            parts.push(format!("对话上下文：\n{}", ctx.memory_summary()));
        }
        if !ctx.prior_outputs().is_empty() {
            let results = ctx
                .prior_outputs()
                .iter()
                .map(|(skill, output)| format!("[{skill}] {}", output.summary))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("之前步骤的结果：\n{results}"));
        }
        parts.push(format!("当前需要回答：{query}"));
        parts.push("请提供清晰、有帮助的回答。".to_string());
        parts.join("\n\n")
    }
}

impl Default for DirectAnswerSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for DirectAnswerSkill {
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
        debug!("Executing direct answer");

        let request = ChatRequest::new()
            .with_user(Self::build_prompt(question, ctx))
            .with_temperature(0.7);
        let reply = ctx.chat(request).await?;

        Ok(SkillOutput::text(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::testing::{ok_invoker, test_context, ScriptedLlm};

    #[test]
    fn test_never_wins_selection() {
        let skill = DirectAnswerSkill::new();
        assert_eq!(skill.can_handle("北京今天天气怎么样？"), 0.0);
        assert_eq!(skill.can_handle("whatever"), 0.0);
    }

    #[tokio::test]
    async fn test_execute_passes_context_into_prompt() {
        let llm = Arc::new(ScriptedLlm::reply("好的，我来回答。"));
        let mut prior = BTreeMap::new();
        prior.insert(
            "weather".to_string(),
            SkillOutput::text("北京当前晴，气温 21°C。"),
        );
        let ctx = test_context(ok_invoker(), llm.clone())
            .with_memory_summary("user: 你好\nassistant: 你好！")
            .with_prior_outputs(prior);

        let output = DirectAnswerSkill::new()
            .execute("帮我总结一下", &Map::new(), &ctx)
            .await
            .unwrap();

        assert_eq!(output.summary, "好的，我来回答。");
        let prompt = llm.last_prompt();
        assert!(prompt.contains("对话上下文"));
        assert!(prompt.contains("[weather] 北京当前晴"));
        assert!(prompt.contains("当前需要回答：帮我总结一下"));
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let ctx = test_context(ok_invoker(), Arc::new(ScriptedLlm::failing("model crashed")));

        let result = DirectAnswerSkill::new()
            .execute("你好", &Map::new(), &ctx)
            .await;

        assert!(result.is_err());
    }
}
