//! Train ticket lookup over the 12306-mcp tool server.

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use skillet_core::Error;

use crate::context::SkillContext;
use crate::skill::{Skill, SkillDescriptor, SkillOutput};

const SERVER: &str = "12306-mcp";
const DATE_TOOL: &str = "get-current-date";
const STATION_TOOL: &str = "get-station-code-by-names";
const TICKETS_TOOL: &str = "get-tickets";

/// Relative date words, longest first so `大后天` wins over its
/// substring `后天`.
const DATE_KEYWORDS: &[(&str, i64)] = &[("大后天", 3), ("后天", 2), ("明天", 1), ("今天", 0)];

/// Train category words mapped to train number prefixes.
const TRAIN_TYPES: &[(&str, &str)] = &[
    ("高铁", "G"),
    ("动车", "D"),
    ("快速", "K"),
    ("特快", "T"),
    ("直达", "Z"),
];

/// Parsed view of one ticket entry.
#[derive(Debug, Clone, serde::Serialize)]
struct TrainInfo {
    train_no: String,
    departure_time: Option<String>,
    arrival_time: Option<String>,
    duration: Option<String>,
    seats: Value,
}

/// Train ticket lookup with route, date and train-type extraction.
pub struct TravelSkill {
    descriptor: SkillDescriptor,
}

impl TravelSkill {
    pub fn new() -> Self {
        Self {
            descriptor: SkillDescriptor::new(
                "travel",
                "查询火车、高铁、动车票务信息，包括车次、余票与时刻。适用于出行规划场景。",
            )
            .with_keywords(["火车", "高铁", "动车", "车票", "余票", "train"])
            .with_pattern(r"从.+到.+")
            .with_priority(10)
            .with_capability("train-tickets"),
        }
    }

    /// Resolve a relative date word against `today`.
    fn resolve_date(query: &str, today: NaiveDate) -> Option<String> {
        for (keyword, days) in DATE_KEYWORDS {
            if query.contains(keyword) {
                let date = today + Duration::days(*days);
                return Some(date.format("%Y-%m-%d").to_string());
            }
        }
        None
    }

    fn extract_route(query: &str) -> Option<(String, String)> {
        let re = Regex::new(r"([^\s到，。,]+)到([^\s的，。,有吗呢？?!！]+)").ok()?;
        let caps = re.captures(query)?;
        let origin = Self::trim_origin(caps.get(1)?.as_str());
        let destination = caps.get(2)?.as_str().to_string();
        (!origin.is_empty() && !destination.is_empty()).then_some((origin, destination))
    }

    /// The route pattern cannot separate `明天从北京` into date,
    /// particle and origin, so peel those off here.
    fn trim_origin(raw: &str) -> String {
        let raw = match raw.rfind('从') {
            Some(idx) => &raw[idx + '从'.len_utf8()..],
            None => raw,
        };
        let mut origin = raw;
        for (keyword, _) in DATE_KEYWORDS {
            if let Some(rest) = origin.strip_prefix(keyword) {
                origin = rest;
                break;
            }
        }
        origin.to_string()
    }

    fn extract_train_type(query: &str) -> Option<String> {
        TRAIN_TYPES
            .iter()
            .find(|(word, _)| query.contains(word))
            .map(|(_, prefix)| (*prefix).to_string())
    }

    async fn current_date(&self, ctx: &SkillContext) -> String {
        let outcome = ctx.call_tool(SERVER, DATE_TOOL, Map::new()).await;
        if outcome.success {
            if let Some(date) = outcome.data.as_ref().and_then(Self::date_from_value) {
                return date;
            }
        }
        // The server also being the clock is a convenience, not a need.
        Local::now().format("%Y-%m-%d").to_string()
    }

    fn date_from_value(value: &Value) -> Option<String> {
        let date = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Object(map) => map.get("date")?.as_str()?.trim().to_string(),
            _ => return None,
        };
        (!date.is_empty()).then_some(date)
    }

    async fn station_code(&self, ctx: &SkillContext, name: &str) -> Option<String> {
        let mut args = Map::new();
        args.insert("names".to_string(), json!(name));
        let outcome = ctx.call_tool(SERVER, STATION_TOOL, args).await;
        if !outcome.success {
            warn!(station = %name, "Failed to look up station code");
            return None;
        }

        match outcome.data? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get(name)
                .or_else(|| map.get("code"))
                .and_then(Self::code_from_value),
            _ => None,
        }
    }

    fn code_from_value(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("station_code")?.as_str().map(str::to_string),
            _ => None,
        }
    }

    fn parse_trains(tickets: &Value, train_type: Option<&str>) -> Vec<TrainInfo> {
        let Some(entries) = tickets.as_array() else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let map = entry.as_object()?;
                let train_no = Self::entry_string(map, &["train_no", "trainNo"])?;
                Some(TrainInfo {
                    departure_time: Self::entry_string(map, &["departure_time", "startTime"]),
                    arrival_time: Self::entry_string(map, &["arrival_time", "arriveTime"]),
                    duration: Self::entry_string(map, &["duration", "costTime"]),
                    seats: map
                        .get("seats")
                        .or_else(|| map.get("tickets"))
                        .cloned()
                        .unwrap_or(Value::Null),
                    train_no,
                })
            })
            .filter(|train| match train_type {
                Some(prefix) => train.train_no.starts_with(prefix),
                None => true,
            })
            .collect()
    }

    fn entry_string(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| map.get(*key))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn format_output(
        origin: &str,
        destination: &str,
        date: &str,
        trains: &[TrainInfo],
        raw: &Value,
    ) -> SkillOutput {
        let mut summary = format!("{date} {origin}→{destination} 共 {} 趟车次。", trains.len());
        for train in trains.iter().take(5) {
            summary.push_str(&format!("\n{}", train.train_no));
            if let (Some(dep), Some(arr)) = (&train.departure_time, &train.arrival_time) {
                summary.push_str(&format!(" {dep}-{arr}"));
            }
            if let Some(duration) = &train.duration {
                summary.push_str(&format!(" 历时{duration}"));
            }
        }
        if trains.is_empty() {
            summary.push_str("请尝试更换日期或车站。");
        }

        let structured = json!({
            "origin": origin,
            "destination": destination,
            "date": date,
            "trains": trains,
            "total": trains.len(),
            "raw": raw,
        });

        SkillOutput::text(summary)
            .with_data(structured)
            .with_source(format!("{SERVER}/{TICKETS_TOOL}"))
    }
}

impl Default for TravelSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for TravelSkill {
    fn descriptor(&self) -> SkillDescriptor {
        self.descriptor.clone()
    }

    fn extract_args(&self, query: &str) -> Map<String, Value> {
        let mut args = Map::new();
        if let Some((origin, destination)) = Self::extract_route(query) {
            args.insert("origin".to_string(), json!(origin));
            args.insert("destination".to_string(), json!(destination));
        }
        if let Some(date) = Self::resolve_date(query, Local::now().date_naive()) {
            args.insert("date".to_string(), json!(date));
        }
        if let Some(train_type) = Self::extract_train_type(query) {
            args.insert("train_type".to_string(), json!(train_type));
        }
        args
    }

    async fn execute(
        &self,
        query: &str,
        args: &Map<String, Value>,
        ctx: &SkillContext,
    ) -> Result<SkillOutput, Error> {
        let route = match (
            args.get("origin").and_then(Value::as_str),
            args.get("destination").and_then(Value::as_str),
        ) {
            (Some(o), Some(d)) => (o.to_string(), d.to_string()),
            _ => Self::extract_route(query)
                .ok_or_else(|| Error::skill("未能识别出发地和目的地"))?,
        };
        let (origin, destination) = route;

        info!(origin = %origin, destination = %destination, "Executing travel query");

        let date = match args.get("date").and_then(Value::as_str) {
            Some(date) => date.to_string(),
            None => self.current_date(ctx).await,
        };

        let origin_code = self.station_code(ctx, &origin).await;
        let dest_code = self.station_code(ctx, &destination).await;
        let (origin_code, dest_code) = match (origin_code, dest_code) {
            (Some(o), Some(d)) => (o, d),
            _ => {
                return Err(Error::skill(format!(
                    "无法识别站点: {origin} 或 {destination}"
                )))
            }
        };

        let mut ticket_args = Map::new();
        ticket_args.insert("origin".to_string(), json!(origin_code));
        ticket_args.insert("destination".to_string(), json!(dest_code));
        ticket_args.insert("date".to_string(), json!(date));
        let outcome = ctx.call_tool(SERVER, TICKETS_TOOL, ticket_args).await;

        if !outcome.success {
            let detail = outcome
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "未知错误".to_string());
            return Err(Error::skill(format!("车票查询失败: {detail}")));
        }

        let raw = outcome.data.unwrap_or(Value::Null);
        let train_type = args.get("train_type").and_then(Value::as_str);
        let trains = Self::parse_trains(&raw, train_type);

        info!(total = trains.len(), "Travel query completed");
        Ok(Self::format_output(&origin, &destination, &date, &trains, &raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::testing::{test_context, ScriptedInvoker, ScriptedLlm};

    #[test]
    fn test_route_extraction() {
        assert_eq!(
            TravelSkill::extract_route("明天从北京到上海的高铁"),
            Some(("北京".to_string(), "上海".to_string()))
        );
        assert_eq!(
            TravelSkill::extract_route("杭州到南京有票吗"),
            Some(("杭州".to_string(), "南京".to_string()))
        );
        assert_eq!(
            TravelSkill::extract_route("后天广州到深圳的动车"),
            Some(("广州".to_string(), "深圳".to_string()))
        );
        assert_eq!(TravelSkill::extract_route("帮我查天气"), None);
    }

    #[test]
    fn test_relative_dates_longest_word_wins() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 23).unwrap();
        assert_eq!(
            TravelSkill::resolve_date("明天去上海", today),
            Some("2025-08-24".to_string())
        );
        // `大后天` contains `后天`; the longer word must win.
        assert_eq!(
            TravelSkill::resolve_date("大后天从北京到上海", today),
            Some("2025-08-26".to_string())
        );
        assert_eq!(TravelSkill::resolve_date("下周去上海", today), None);
    }

    #[test]
    fn test_train_type_extraction() {
        assert_eq!(
            TravelSkill::extract_train_type("从北京到上海的高铁"),
            Some("G".to_string())
        );
        assert_eq!(TravelSkill::extract_train_type("随便什么车"), None);
    }

    #[test]
    fn test_parse_trains_filters_by_prefix() {
        let tickets = json!([
            {"train_no": "G1", "startTime": "08:00", "arriveTime": "12:38", "costTime": "4小时38分"},
            {"train_no": "K511", "departure_time": "09:10"},
            {"not_a_train": true}
        ]);

        let all = TravelSkill::parse_trains(&tickets, None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].train_no, "G1");
        assert_eq!(all[0].departure_time.as_deref(), Some("08:00"));

        let g_only = TravelSkill::parse_trains(&tickets, Some("G"));
        assert_eq!(g_only.len(), 1);
        assert_eq!(g_only[0].train_no, "G1");
    }

    #[tokio::test]
    async fn test_execute_full_flow() {
        let invoker = ScriptedInvoker::new(|_, tool, args| {
            let data = match tool {
                "get-current-date" => json!("2025-08-23"),
                "get-station-code-by-names" => {
                    let name = args.get("names").and_then(Value::as_str).unwrap_or("");
                    json!({name: {"station_code": format!("{}P", &name[..3.min(name.len())])}})
                }
                "get-tickets" => json!([
                    {"train_no": "G1", "startTime": "08:00", "arriveTime": "12:38"},
                    {"train_no": "D5", "startTime": "10:00", "arriveTime": "16:02"}
                ]),
                _ => json!(null),
            };
            skillet_core::ToolOutcome::ok(data)
        });
        let ctx = test_context(invoker.clone(), Arc::new(ScriptedLlm::reply("")));

        let skill = TravelSkill::new();
        let query = "从北京到上海的高铁";
        let args = skill.extract_args(query);
        let output = skill.execute(query, &args, &ctx).await.unwrap();

        // Train-type G filters out the D train.
        assert!(output.summary.contains("共 1 趟车次"));
        assert!(output.summary.contains("G1"));
        let data = output.data.unwrap();
        assert_eq!(data["origin"], "北京");
        assert_eq!(data["destination"], "上海");
        assert_eq!(data["total"], 1);
        // Date tool plus two station lookups plus the ticket query.
        assert_eq!(invoker.calls(), 4);
    }

    #[tokio::test]
    async fn test_unknown_station_degrades() {
        let invoker = ScriptedInvoker::new(|_, tool, _| match tool {
            "get-current-date" => skillet_core::ToolOutcome::ok(json!("2025-08-23")),
            _ => skillet_core::ToolOutcome::ok(json!({})),
        });
        let ctx = test_context(invoker.clone(), Arc::new(ScriptedLlm::reply("")));

        let result = TravelSkill::new()
            .execute("从月球到火星", &Map::new(), &ctx)
            .await;

        let err = result.err().unwrap();
        assert!(err.to_string().contains("无法识别站点"));
    }
}
