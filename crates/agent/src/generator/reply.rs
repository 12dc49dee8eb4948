//! Turning a model reply into a summary and seven daily actions.
//!
//! Two shapes are accepted, tried in order:
//!
//! 1. A JSON object `{"summary": .., "actions": [{"day", "action", "rationale"}]}`,
//!    optionally wrapped in a Markdown code fence or surrounded by prose.
//! 2. Plain text with one `Day N: ...` line per day. Ranges such as
//!    `Day 1-2: ...` apply the same action to each day. Lines before the
//!    first day form the summary.

use farmloop_core::plan::{PLAN_DAYS, PlanAction};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::warn;

/// A reply reduced to its plan content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub summary: String,
    pub actions: Vec<PlanAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("reply too short ({chars} chars, need at least {min})")]
    TooShort { chars: usize, min: usize },

    #[error("reply covers {found} of 7 days (missing day {first_missing})")]
    MissingDays { found: usize, first_missing: u8 },
}

#[derive(Debug, Deserialize)]
struct JsonReply {
    #[serde(default)]
    summary: String,
    #[serde(alias = "plan", alias = "days")]
    actions: Vec<JsonAction>,
}

#[derive(Debug, Deserialize)]
struct JsonAction {
    #[serde(default)]
    day: Option<DayNumber>,
    #[serde(alias = "task")]
    action: String,
    #[serde(default, alias = "reason")]
    rationale: Option<String>,
}

/// Models write the day as `1`, `"1"` or `"Day 1"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DayNumber {
    Number(u32),
    Text(String),
}

impl DayNumber {
    fn value(&self) -> Option<u32> {
        match self {
            DayNumber::Number(n) => Some(*n),
            DayNumber::Text(text) => text
                .split(|c: char| !c.is_ascii_digit())
                .find(|part| !part.is_empty())
                .and_then(|digits| digits.parse().ok()),
        }
    }
}

fn day_line() -> &'static Regex {
    static DAY_LINE: OnceLock<Regex> = OnceLock::new();
    DAY_LINE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^[\s>#*\-•]*day\s*(\d{1,2})",
            r"(?:\s*(?:-|–|—|to)\s*(?:day\s*)?(\d{1,2}))?",
            r"(?:\s*\([^)]*\))?",
            r"\s*\**\s*[:.)\-–—]\s*\**\s*(.+)$",
        ))
        .expect("Invalid day-line pattern")
    })
}

fn trailing_rationale() -> &'static Regex {
    static RATIONALE: OnceLock<Regex> = OnceLock::new();
    RATIONALE.get_or_init(|| {
        Regex::new(r"^(.*?)\s*\(([^()]+)\)\s*$").expect("Invalid rationale pattern")
    })
}

/// Parse a reply into a plan body.
///
/// Replies shorter than `min_chars` (after trimming) are rejected outright.
pub fn parse_reply(text: &str, min_chars: usize) -> Result<ParsedReply, ReplyError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars < min_chars {
        return Err(ReplyError::TooShort {
            chars,
            min: min_chars,
        });
    }

    let (summary, days) = match parse_json(trimmed) {
        Some(parsed) => parsed,
        None => parse_lines(trimmed),
    };

    let actions = complete_week(days)?;
    Ok(ParsedReply { summary, actions })
}

/// The outermost `{ ... }` span, which skips code fences and chatter.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_json(text: &str) -> Option<(String, BTreeMap<u32, PlanAction>)> {
    let reply: JsonReply = serde_json::from_str(json_span(text)?).ok()?;
    let mut days = BTreeMap::new();
    for (position, entry) in reply.actions.into_iter().enumerate() {
        let day = entry
            .day
            .as_ref()
            .and_then(DayNumber::value)
            .unwrap_or(position as u32 + 1);
        let action = entry.action.trim();
        if action.is_empty() {
            continue;
        }
        days.entry(day).or_insert_with(|| PlanAction {
            day: 0,
            action: action.to_string(),
            rationale: entry
                .rationale
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
        });
    }
    Some((reply.summary.trim().to_string(), days))
}

fn parse_lines(text: &str) -> (String, BTreeMap<u32, PlanAction>) {
    let mut summary = Vec::new();
    let mut days = BTreeMap::new();
    let mut seen_day = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(caps) = day_line().captures(line) else {
            if !seen_day {
                summary.push(line.trim_matches(['*', '#', ' ']));
            }
            continue;
        };
        seen_day = true;

        let first: u32 = caps[1].parse().unwrap_or(0);
        let last: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(first);
        let body = caps[3].trim().trim_end_matches('*').trim();

        let (action, rationale) = match trailing_rationale().captures(body) {
            Some(r) if !r[1].is_empty() => (r[1].to_string(), Some(r[2].trim().to_string())),
            _ => (body.to_string(), None),
        };

        for day in first..=last.max(first) {
            days.entry(day).or_insert_with(|| PlanAction {
                day: 0,
                action: action.clone(),
                rationale: rationale.clone(),
            });
        }
    }

    (summary.join(" "), days)
}

/// Keep days `1..=7`, number them, and require every one to be present.
fn complete_week(mut days: BTreeMap<u32, PlanAction>) -> Result<Vec<PlanAction>, ReplyError> {
    let extra: Vec<u32> = days
        .keys()
        .copied()
        .filter(|d| *d == 0 || *d as usize > PLAN_DAYS)
        .collect();
    if !extra.is_empty() {
        warn!(days = ?extra, "Dropping plan entries outside the 7-day window");
        for day in extra {
            days.remove(&day);
        }
    }

    let mut actions = Vec::with_capacity(PLAN_DAYS);
    for day in 1..=PLAN_DAYS as u8 {
        match days.remove(&u32::from(day)) {
            Some(mut action) => {
                action.day = day;
                actions.push(action);
            }
            None => {
                return Err(ReplyError::MissingDays {
                    found: actions.len() + days.len(),
                    first_missing: day,
                });
            }
        }
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON_REPLY: &str = r#"```json
{
  "summary": "Dry, mild week. Keep moisture up during tillering.",
  "actions": [
    {"day": 1, "action": "Light irrigation in the morning", "rationale": "no rain for 5 days"},
    {"day": 2, "action": "Scout for aphids"},
    {"day": 3, "action": "Rest day"},
    {"day": 4, "action": "Apply first nitrogen top-dressing", "rationale": "tillering stage"},
    {"day": 5, "action": "Weed between rows"},
    {"day": 6, "action": "Rest day"},
    {"day": 7, "action": "Check soil moisture by hand"}
  ]
}
```"#;

    #[test]
    fn parses_fenced_json() {
        let parsed = parse_reply(JSON_REPLY, 50).unwrap();
        assert_eq!(parsed.summary, "Dry, mild week. Keep moisture up during tillering.");
        assert_eq!(parsed.actions.len(), 7);
        assert_eq!(parsed.actions[0].day, 1);
        assert_eq!(
            parsed.actions[0].rationale.as_deref(),
            Some("no rain for 5 days")
        );
        assert_eq!(parsed.actions[6].action, "Check soil moisture by hand");
    }

    #[test]
    fn parses_day_lines_with_ranges() {
        let text = "Here is your plan for the week.\n\n\
            **Day 1–2:** Monitor crop health and soil moisture\n\
            Day 3: Light irrigation if soil is dry (topsoil cracking)\n\
            - Day 4: Field inspection for pests\n\
            Day 5. Nutrient top-up if leaves yellow\n\
            Day 6 - Weed management or rest\n\
            Day 7: General monitoring\n";
        let parsed = parse_reply(text, 50).unwrap();
        assert_eq!(parsed.summary, "Here is your plan for the week.");
        let days: Vec<u8> = parsed.actions.iter().map(|a| a.day).collect();
        assert_eq!(days, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(parsed.actions[1].action, "Monitor crop health and soil moisture");
        assert_eq!(
            parsed.actions[2].rationale.as_deref(),
            Some("topsoil cracking")
        );
        assert_eq!(parsed.actions[5].action, "Weed management or rest");
    }

    #[test]
    fn short_reply_is_rejected() {
        assert_eq!(
            parse_reply("Water the crop.", 50),
            Err(ReplyError::TooShort { chars: 15, min: 50 })
        );
    }

    #[test]
    fn missing_days_are_rejected() {
        let text = "Day 1: Irrigate the field lightly\n\
                    Day 2: Scout for pests\n\
                    Day 4: Rest day for the whole field";
        match parse_reply(text, 10) {
            Err(ReplyError::MissingDays { first_missing, .. }) => assert_eq!(first_missing, 3),
            other => panic!("expected MissingDays, got {other:?}"),
        }
    }

    #[test]
    fn extra_days_are_truncated() {
        let text: String = (1..=9)
            .map(|d| format!("Day {d}: task number {d}\n"))
            .collect();
        let parsed = parse_reply(&text, 10).unwrap();
        assert_eq!(parsed.actions.len(), 7);
        assert_eq!(parsed.actions[6].action, "task number 7");
    }

    #[test]
    fn json_without_day_numbers_uses_order() {
        let actions: Vec<String> = (1..=7)
            .map(|d| format!(r#"{{"action": "step {d}"}}"#))
            .collect();
        let text = format!(r#"{{"summary": "s", "plan": [{}]}}"#, actions.join(","));
        let parsed = parse_reply(&text, 10).unwrap();
        assert_eq!(parsed.actions[3].day, 4);
        assert_eq!(parsed.actions[3].action, "step 4");
    }

    #[test]
    fn day_lines_with_weekday_labels() {
        let weekdays = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let text: String = weekdays
            .iter()
            .enumerate()
            .map(|(i, wd)| format!("**Day {} ({wd}):** Scout the field edges\n", i + 1))
            .collect();
        let parsed = parse_reply(&text, 10).unwrap();
        assert_eq!(parsed.actions.len(), 7);
        assert_eq!(parsed.actions[0].action, "Scout the field edges");
        assert_eq!(parsed.actions[6].day, 7);
    }

    #[test]
    fn json_day_numbers_may_be_strings() {
        let actions: Vec<String> = (1..=7)
            .rev()
            .map(|d| format!(r#"{{"day": "{d}", "action": "step {d}"}}"#))
            .collect();
        let text = format!(r#"{{"summary": "s", "actions": [{}]}}"#, actions.join(","));
        let parsed = parse_reply(&text, 10).unwrap();
        assert_eq!(parsed.actions[0].day, 1);
        assert_eq!(parsed.actions[0].action, "step 1");

        let labelled = text.replace(r#""day": ""#, r#""day": "Day "#);
        let parsed = parse_reply(&labelled, 10).unwrap();
        assert_eq!(parsed.actions[6].action, "step 7");
    }
}
