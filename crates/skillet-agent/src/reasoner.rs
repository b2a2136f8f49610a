//! Reply synthesis.
//!
//! Turns execution results into the final user-facing reply. Failed
//! runs get an apology instead of a raw error, and that apology is
//! produced even when the LLM itself is down: the user always receives
//! a non-empty answer.

use std::sync::Arc;

use tracing::{debug, warn};

use skillet_core::Error;
use skillet_llm::{ChatRequest, LlmClient};

use crate::executor::ExecutionReport;

/// Per-step result cap inside the synthesis prompt, in characters.
const RESULT_CHARS: usize = 1000;

/// A lone result shorter than this still goes through synthesis; it is
/// too thin to stand on its own as a reply.
const DIRECT_RESULT_MIN_CHARS: usize = 10;

const SYNTHESIZE_TEMPERATURE: f32 = 0.5;
const FAILURE_TEMPERATURE: f32 = 0.7;

/// Produces the final reply from execution results.
pub struct Reasoner {
    llm: Arc<dyn LlmClient>,
}

impl Reasoner {
    /// Create a reasoner over an LLM endpoint.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Synthesize a reply for a run with at least one successful step.
    ///
    /// A single substantial result skips the LLM and is returned
    /// verbatim; anything else is summarized in one completion call.
    pub async fn synthesize(&self, query: &str, report: &ExecutionReport) -> Result<String, Error> {
        if let Some(direct) = Self::direct_result(report) {
            debug!("Single-step result returned verbatim");
            return Ok(direct);
        }

        let prompt = format!(
            "请根据执行结果回答用户的问题。\n\
             \n\
             ## 原始问题\n\
             {query}\n\
             \n\
             ## 执行结果\n\
             {results}\n\
             \n\
             ## 要求\n\
             1. 直接回答问题，不要复述执行过程\n\
             2. 使用与问题相同的语言回答\n\
             3. 结果不完整时如实说明",
            results = Self::format_results(report),
        );

        let request = ChatRequest::new()
            .with_user(prompt)
            .with_temperature(SYNTHESIZE_TEMPERATURE);
        self.llm.chat(request).await.map_err(Error::from)
    }

    /// Produce the reply for a failed run. Never fails and never
    /// returns an empty string: when the LLM cannot help, a canned
    /// apology carries the error detail instead.
    pub async fn handle_failure(&self, query: &str, error_info: &str) -> String {
        let prompt = format!(
            "用户的问题是：{query}\n\
             \n\
             处理过程中遇到了问题：{error_info}\n\
             \n\
             请生成一个友好的简短回复，向用户说明情况，并尽量给出替代建议。"
        );
        let request = ChatRequest::new()
            .with_user(prompt)
            .with_temperature(FAILURE_TEMPERATURE);

        match self.llm.chat(request).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => Self::canned_apology(error_info),
            Err(e) => {
                warn!(error = %e, "Failure reply fell back to the canned apology");
                Self::canned_apology(error_info)
            }
        }
    }

    fn canned_apology(error_info: &str) -> String {
        format!("抱歉，处理您的请求时遇到了问题：{error_info}")
    }

    fn direct_result(report: &ExecutionReport) -> Option<String> {
        match report.steps.as_slice() {
            [step] if step.success => {
                let summary = &step.output.as_ref()?.summary;
                (summary.chars().count() > DIRECT_RESULT_MIN_CHARS).then(|| summary.clone())
            }
            _ => None,
        }
    }

    fn format_results(report: &ExecutionReport) -> String {
        report
            .steps
            .iter()
            .map(|step| {
                let status = if step.success { "成功" } else { "失败" };
                let body = if step.success {
                    let summary = step
                        .output
                        .as_ref()
                        .map(|o| truncate_result(&o.summary))
                        .unwrap_or_else(|| "（空）".to_string());
                    format!("结果: {summary}")
                } else {
                    let message = step
                        .error
                        .as_ref()
                        .map(|e| e.message.as_str())
                        .unwrap_or("未知错误");
                    format!("错误: {message}")
                };
                format!(
                    "### 步骤 {}: {}\n状态: {status}\n{body}",
                    step.index + 1,
                    step.skill
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Keep prompts bounded when a tool returns pages of text.
fn truncate_result(summary: &str) -> String {
    if summary.chars().count() <= RESULT_CHARS {
        summary.to_string()
    } else {
        let mut cut: String = summary.chars().take(RESULT_CHARS).collect();
        cut.push_str("...(已截断)");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use skillet_core::{ErrorDetail, ErrorKind};
    use skillet_skills::testing::ScriptedLlm;
    use skillet_skills::SkillOutput;

    use crate::executor::StepResult;

    fn ok_step(index: usize, skill: &str, summary: &str) -> StepResult {
        StepResult {
            index,
            skill: skill.to_string(),
            success: true,
            output: Some(SkillOutput::text(summary)),
            error: None,
            duration_ms: 3,
        }
    }

    fn failed_step(index: usize, skill: &str, message: &str) -> StepResult {
        StepResult {
            index,
            skill: skill.to_string(),
            success: false,
            output: None,
            error: Some(ErrorDetail::new(ErrorKind::SkillExecution, message)),
            duration_ms: 3,
        }
    }

    fn report(steps: Vec<StepResult>) -> ExecutionReport {
        ExecutionReport {
            steps,
            aborted: false,
        }
    }

    #[tokio::test]
    async fn test_single_substantial_result_skips_the_llm() {
        let llm = Arc::new(ScriptedLlm::reply("unused"));
        let reasoner = Reasoner::new(llm.clone());

        let reply = reasoner
            .synthesize(
                "北京天气",
                &report(vec![ok_step(0, "weather", "北京当前晴，气温 21°C。")]),
            )
            .await
            .unwrap();

        assert_eq!(reply, "北京当前晴，气温 21°C。");
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_thin_single_result_still_synthesizes() {
        let llm = Arc::new(ScriptedLlm::reply("今天是晴天。"));
        let reasoner = Reasoner::new(llm.clone());

        let reply = reasoner
            .synthesize("北京天气", &report(vec![ok_step(0, "weather", "晴")]))
            .await
            .unwrap();

        assert_eq!(reply, "今天是晴天。");
        assert_eq!(llm.requests().len(), 1);
        assert!(llm.last_prompt().contains("## 原始问题"));
    }

    #[tokio::test]
    async fn test_mixed_results_render_status_and_errors() {
        let llm = Arc::new(ScriptedLlm::reply("综合回答"));
        let reasoner = Reasoner::new(llm.clone());

        let reply = reasoner
            .synthesize(
                "查询并总结",
                &report(vec![
                    ok_step(0, "weather", "北京当前晴，气温 21°C。"),
                    failed_step(1, "travel", "12306 连接超时"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(reply, "综合回答");
        let prompt = llm.last_prompt();
        assert!(prompt.contains("### 步骤 1: weather"));
        assert!(prompt.contains("状态: 成功"));
        assert!(prompt.contains("### 步骤 2: travel"));
        assert!(prompt.contains("状态: 失败"));
        assert!(prompt.contains("错误: 12306 连接超时"));
    }

    #[tokio::test]
    async fn test_long_results_are_truncated_in_prompt() {
        let llm = Arc::new(ScriptedLlm::reply("ok"));
        let reasoner = Reasoner::new(llm.clone());

        let long = format!("{}{}", "长".repeat(1000), "不应出现");
        reasoner
            .synthesize(
                "q",
                &report(vec![ok_step(0, "knowledge", &long), ok_step(1, "summarize", "摘要")]),
            )
            .await
            .unwrap();

        let prompt = llm.last_prompt();
        assert!(prompt.contains("...(已截断)"));
        assert!(!prompt.contains("不应出现"));
    }

    #[tokio::test]
    async fn test_failure_reply_uses_llm() {
        let llm = Arc::new(ScriptedLlm::reply("非常抱歉，天气服务暂时不可用，您可以稍后再试。"));
        let reasoner = Reasoner::new(llm.clone());

        let reply = reasoner.handle_failure("北京天气", "天气查询失败: 连接被拒绝").await;

        assert!(reply.contains("非常抱歉"));
        let prompt = llm.last_prompt();
        assert!(prompt.contains("北京天气"));
        assert!(prompt.contains("连接被拒绝"));
    }

    #[tokio::test]
    async fn test_failure_reply_survives_llm_outage() {
        let reasoner = Reasoner::new(Arc::new(ScriptedLlm::failing("model down")));

        let reply = reasoner.handle_failure("北京天气", "天气查询失败: 连接被拒绝").await;

        assert!(!reply.trim().is_empty());
        assert!(reply.contains("抱歉"));
        assert!(reply.contains("连接被拒绝"));
    }
}
