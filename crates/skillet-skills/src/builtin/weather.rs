//! City weather lookup over the amap-maps tool server.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::info;

use skillet_core::Error;

use crate::context::SkillContext;
use crate::retry::with_retries;
use crate::skill::{Skill, SkillDescriptor, SkillOutput};

const SERVER: &str = "amap-maps";
const TOOL: &str = "maps_weather";

/// Cities recognized without any sentence pattern.
const COMMON_CITIES: &[&str] = &[
    "北京", "上海", "广州", "深圳", "杭州", "成都", "武汉", "南京", "西安", "重庆", "苏州",
    "天津", "青岛", "厦门",
];

/// Date/time words that leak into the regex capture and must be stripped.
const NOISE_WORDS: &[&str] = &["今天", "明天", "后天", "现在", "当前", "这周"];

/// Travel advice keyed by weather condition substring.
const WEATHER_SUGGESTIONS: &[(&str, &str)] = &[
    ("晴", "天气晴好，适合户外活动，注意防晒。"),
    ("多云", "多云天气，温度适宜，可以外出。"),
    ("阴", "阴天，可能较凉，建议携带外套。"),
    ("小雨", "有小雨，建议携带雨具。"),
    ("中雨", "中雨天气，出行请携带雨伞，注意路滑。"),
    ("大雨", "大雨天气，建议减少外出，注意安全。"),
    ("暴雨", "暴雨预警，请尽量避免外出。"),
    ("雪", "下雪天气，注意保暖和路面湿滑。"),
    ("雾", "有雾，能见度低，驾车请注意安全。"),
    ("霾", "有霾，空气质量较差，建议佩戴口罩。"),
];

/// Weather lookup with city extraction and travel suggestions.
pub struct WeatherSkill {
    descriptor: SkillDescriptor,
}

impl WeatherSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor::new(
                "weather",
                "查询城市天气信息，包括实时天气与出行建议。适用于出行规划场景。",
            )
            .with_keywords(["天气", "weather", "气温", "下雨"])
            .with_pattern(r"(?i)weather\s+in\s+\S+")
            .with_priority(10)
            .with_capability("weather-lookup"),
        }
    }

    /// Pull a city name out of the query.
    ///
    /// Known city names win over the sentence pattern, so a query like
    /// `"北京今天天气怎么样？"` yields `北京` rather than the noisy
    /// capture `北京今天`.
    fn extract_city(query: &str) -> Option<String> {
        for city in COMMON_CITIES {
            if query.contains(city) {
                return Some((*city).to_string());
            }
        }

        let re = Regex::new(r"([^\s，。！？?!,\.]+?)的?天气").ok()?;
        let capture = re.captures(query)?.get(1)?.as_str();
        let mut city = capture.to_string();
        for noise in NOISE_WORDS {
            city = city.replace(noise, "");
        }
        (!city.is_empty()).then_some(city)
    }

    fn suggestion_for(weather: &str) -> String {
        for (key, suggestion) in WEATHER_SUGGESTIONS {
            if weather.contains(key) {
                return (*suggestion).to_string();
            }
        }
        format!("当前天气{weather}，请根据实际情况安排出行。")
    }

    /// First present field among `keys`, rendered as a string.
    fn field_string(data: &Value, keys: &[&str]) -> Option<String> {
        for key in keys {
            match data.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }

    fn format_output(city: &str, data: &Value) -> SkillOutput {
        // The amap live-weather reply nests the report under "lives".
        let report = data
            .get("lives")
            .and_then(|lives| lives.get(0))
            .unwrap_or(data);

        let weather = Self::field_string(report, &["weather", "condition"]);
        let temperature = Self::field_string(report, &["temperature", "temp"]);
        let humidity = Self::field_string(report, &["humidity"]);
        let wind = Self::field_string(report, &["winddirection", "wind"]);
        let wind_power = Self::field_string(report, &["windpower", "wind_power"]);
        let suggestion = match &weather {
            Some(w) => Self::suggestion_for(w),
            None => "无法获取天气信息，请稍后重试。".to_string(),
        };

        let mut summary = format!("{city}当前");
        match (&weather, &temperature) {
            (Some(w), Some(t)) => summary.push_str(&format!("{w}，气温 {t}°C")),
            (Some(w), None) => summary.push_str(w),
            (None, Some(t)) => summary.push_str(&format!("气温 {t}°C")),
            (None, None) => summary.push_str("天气信息不完整"),
        }
        if let Some(h) = &humidity {
            summary.push_str(&format!("，湿度 {h}%"));
        }
        summary.push_str(&format!("。{suggestion}"));

        let structured = json!({
            "city": city,
            "weather": weather,
            "temperature": temperature,
            "humidity": humidity,
            "wind": wind,
            "wind_power": wind_power,
            "suggestion": suggestion,
            "raw": data,
        });

        SkillOutput::text(summary)
            .with_data(structured)
            .with_source(format!("{SERVER}/{TOOL}"))
    }
}

impl Default for WeatherSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for WeatherSkill {
    fn descriptor(&self) -> SkillDescriptor {
        self.descriptor.clone()
    }

    fn extract_args(&self, query: &str) -> Map<String, Value> {
        let mut args = Map::new();
        if let Some(city) = Self::extract_city(query) {
            args.insert("city".to_string(), json!(city));
        }
        args
    }

    async fn execute(
        &self,
        query: &str,
        args: &Map<String, Value>,
        ctx: &SkillContext,
    ) -> Result<SkillOutput, Error> {
        let city = args
            .get("city")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Self::extract_city(query))
            .ok_or_else(|| Error::skill("未能从查询中识别城市名称"))?;

        info!(city = %city, "Executing weather lookup");

        let mut call_args = Map::new();
        call_args.insert("city".to_string(), json!(city));
        let outcome = with_retries(2, || ctx.call_tool(SERVER, TOOL, call_args.clone())).await;

        if !outcome.success {
            let detail = outcome
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "未知错误".to_string());
            return Err(Error::skill(format!("天气查询失败: {detail}")));
        }

        let data = outcome.data.unwrap_or(Value::Null);
        Ok(Self::format_output(&city, &data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillet_core::ErrorKind;
    use std::sync::Arc;

    use crate::testing::{failing_invoker, test_context, ScriptedInvoker, ScriptedLlm};

    #[test]
    fn test_extract_city_prefers_known_names() {
        assert_eq!(
            WeatherSkill::extract_city("北京今天天气怎么样？"),
            Some("北京".to_string())
        );
        assert_eq!(
            WeatherSkill::extract_city("苏州的天气如何"),
            Some("苏州".to_string())
        );
    }

    #[test]
    fn test_extract_city_strips_date_words() {
        // Not on the known-city list, so the sentence pattern applies.
        assert_eq!(
            WeatherSkill::extract_city("昆明今天天气怎么样"),
            Some("昆明".to_string())
        );
        assert_eq!(WeatherSkill::extract_city("你好呀"), None);
    }

    #[test]
    fn test_confidence_via_keywords() {
        let skill = WeatherSkill::new();
        assert_eq!(skill.can_handle("北京今天天气怎么样？"), 0.9);
        assert_eq!(skill.can_handle("What's the weather today?"), 0.9);
        assert_eq!(skill.can_handle("帮我订火车票"), 0.0);
    }

    #[test]
    fn test_extract_args_covers_planner_scenario() {
        let skill = WeatherSkill::new();
        let args = skill.extract_args("北京今天天气怎么样？");
        assert_eq!(args.get("city"), Some(&json!("北京")));
    }

    #[test]
    fn test_suggestions() {
        assert!(WeatherSkill::suggestion_for("晴").contains("防晒"));
        assert!(WeatherSkill::suggestion_for("中雨").contains("雨伞"));
        assert!(WeatherSkill::suggestion_for("沙尘").contains("沙尘"));
    }

    #[tokio::test]
    async fn test_execute_formats_live_report() {
        let invoker = ScriptedInvoker::new(|_, _, args| {
            assert_eq!(args.get("city"), Some(&json!("北京")));
            skillet_core::ToolOutcome::ok(json!({
                "lives": [{
                    "weather": "晴",
                    "temperature": "21",
                    "humidity": "40",
                    "winddirection": "东北",
                    "windpower": "3"
                }]
            }))
        });
        let ctx = test_context(invoker.clone(), Arc::new(ScriptedLlm::reply("")));

        let skill = WeatherSkill::new();
        let args = skill.extract_args("北京今天天气怎么样？");
        let output = skill
            .execute("北京今天天气怎么样？", &args, &ctx)
            .await
            .unwrap();

        assert!(output.summary.contains("北京"));
        assert!(output.summary.contains("晴"));
        assert!(output.summary.contains("21"));
        assert_eq!(output.sources, vec!["amap-maps/maps_weather"]);
        let data = output.data.unwrap();
        assert_eq!(data["city"], "北京");
        assert_eq!(data["suggestion"], "天气晴好，适合户外活动，注意防晒。");
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test]
    async fn test_execute_without_city_never_calls_tools() {
        let invoker = ScriptedInvoker::new(|_, _, _| {
            skillet_core::ToolOutcome::ok(json!({}))
        });
        let ctx = test_context(invoker.clone(), Arc::new(ScriptedLlm::reply("")));

        let result = WeatherSkill::new()
            .execute("讲个笑话", &Map::new(), &ctx)
            .await;

        assert!(result.is_err());
        assert_eq!(invoker.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_retries_then_degrades() {
        let invoker = failing_invoker(ErrorKind::Transport, "connection refused");
        let ctx = test_context(invoker.clone(), Arc::new(ScriptedLlm::reply("")));

        let mut args = Map::new();
        args.insert("city".to_string(), json!("北京"));
        let result = WeatherSkill::new().execute("北京天气", &args, &ctx).await;

        let err = result.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::SkillExecution);
        assert!(err.to_string().contains("connection refused"));
        // Opted into one retry.
        assert_eq!(invoker.calls(), 2);
    }
}
