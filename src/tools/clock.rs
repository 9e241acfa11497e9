//! `current_time` tool: models have no notion of "now", so they ask for it.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::error::{DeskError, Result};
use crate::tool::Tool;

pub struct CurrentTimeTool {
    now: fn() -> DateTime<Utc>,
}

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self { now: Utc::now }
    }

    /// Pin the clock; used by tests.
    pub fn with_clock(now: fn() -> DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in ISO 8601 format. Expects {\"timezone\"?: string} \
         where timezone is UTC (default), local, or a fixed offset such as +05:30 or UTC-8."
    }

    fn parameters(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "UTC, local, or an offset like +02:00"
                }
            }
        }))
    }

    async fn call(&self, input: Value) -> Result<Value> {
        let timezone = match input.get("timezone") {
            None | Some(Value::Null) => "UTC",
            Some(Value::String(tz)) if tz.trim().is_empty() => "UTC",
            Some(Value::String(tz)) => tz.as_str(),
            Some(_) => {
                return Err(DeskError::Protocol(
                    "`timezone` for current_time must be a string".into(),
                ))
            }
        };

        let now = (self.now)();
        let iso8601 = match timezone.trim().to_ascii_lowercase().as_str() {
            "utc" | "z" | "gmt" => now.to_rfc3339_opts(SecondsFormat::Secs, false),
            "local" => now
                .with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            _ => match parse_offset(timezone) {
                Some(offset) => now
                    .with_timezone(&offset)
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
                None => {
                    return Ok(json!({
                        "timezone": timezone,
                        "error": format!(
                            "unsupported timezone `{timezone}`; use UTC, local or an offset like +05:30"
                        ),
                    }))
                }
            },
        };

        Ok(json!({ "timezone": timezone, "iso8601": iso8601 }))
    }
}

/// Parse `+05:30`, `-0800`, `+2`, `UTC+5`, `GMT-03:00`.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    let upper = trimmed.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    let (sign, digits) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == ':') {
        return None;
    }

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if digits.len() == 4 => (
            digits.get(..2)?.parse::<i32>().ok()?,
            digits.get(2..)?.parse::<i32>().ok()?,
        ),
        None => (digits.parse::<i32>().ok()?, 0),
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
