//! Schedule export reader.
//!
//! Turns a schedule export document into the flat, ordered sequence of raw
//! task records the engine consumes. Documents are JSON or YAML, optionally
//! gzip-compressed, and are either a bare list of task records or an object
//! with a `tasks` list.
//!
//! Field values are normalized leniently: unparseable dates and durations
//! become missing, percentages are clamped into [0, 100]. Only the ordering
//! and the outline level are load-bearing.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::Path;

/// Accepted date layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// One task entry as supplied by the schedule export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTask {
    #[serde(deserialize_with = "de_identifier")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub outline_level: u32,
    #[serde(default, deserialize_with = "de_date")]
    pub start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_date")]
    pub finish: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_date")]
    pub actual_finish: Option<NaiveDate>,
    /// Duration in time units; zero means instantaneous.
    #[serde(default, deserialize_with = "de_duration")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "de_percent")]
    pub percent_complete: f64,
    #[serde(default, deserialize_with = "de_flag")]
    pub milestone: bool,
    #[serde(default)]
    pub notes: Option<String>,
    /// Project code supplied on a top-level entry.
    #[serde(default)]
    pub code: Option<String>,
}

impl RawTask {
    /// Minimal record, used by tests and programmatic callers.
    pub fn new(id: impl Into<String>, name: impl Into<String>, outline_level: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            outline_level,
            start: None,
            finish: None,
            actual_finish: None,
            duration: None,
            percent_complete: 0.0,
            milestone: false,
            notes: None,
            code: None,
        }
    }

    pub fn with_finish(mut self, finish: NaiveDate) -> Self {
        self.finish = Some(finish);
        self
    }

    pub fn with_start(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent_complete = clamp_percent(percent);
        self
    }

    pub fn flagged(mut self) -> Self {
        self.milestone = true;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScheduleDocument {
    Wrapped { tasks: Vec<RawTask> },
    Bare(Vec<RawTask>),
}

impl ScheduleDocument {
    fn into_tasks(self) -> Vec<RawTask> {
        match self {
            ScheduleDocument::Wrapped { tasks } | ScheduleDocument::Bare(tasks) => tasks,
        }
    }
}

/// Parse a schedule document from text (JSON is valid YAML, so one parser covers both).
pub fn parse_tasks(content: &str) -> Result<Vec<RawTask>> {
    let value: Value = serde_yaml::from_str(content).context("schedule document is not valid JSON or YAML")?;
    let document: ScheduleDocument = serde_json::from_value(value)
        .context("schedule document must be a task list or an object with a `tasks` list")?;
    Ok(document.into_tasks())
}

/// Load a schedule document from a file (supports both plain text and gzip).
pub fn load_tasks(path: &Path) -> Result<Vec<RawTask>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let content = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
        let mut text = String::new();
        decoder
            .read_to_string(&mut text)
            .with_context(|| format!("decompressing {}", path.display()))?;
        text
    } else {
        String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8", path.display()))?
    };

    parse_tasks(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Parse a date in any accepted layout. Time-of-day suffixes are ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Parse an ISO-8601 duration (`PT8H0M0S`, `P2D`, `PT0S`) into hours.
pub fn parse_iso_duration(raw: &str) -> Option<f64> {
    let rest = raw.trim().strip_prefix('P')?;
    let (date_part, time_part) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut hours = 0.0;
    let mut seen = false;
    for (part, units) in [
        (date_part, &[('W', 168.0), ('D', 24.0)][..]),
        (time_part.unwrap_or(""), &[('H', 1.0), ('M', 1.0 / 60.0), ('S', 1.0 / 3600.0)][..]),
    ] {
        let mut number = String::new();
        for ch in part.chars() {
            if ch.is_ascii_digit() || ch == '.' {
                number.push(ch);
                continue;
            }
            let (_, factor) = units.iter().find(|(unit, _)| *unit == ch)?;
            let value: f64 = number.parse().ok()?;
            hours += value * factor;
            seen = true;
            number.clear();
        }
        if !number.is_empty() {
            return None;
        }
    }

    seen.then_some(hours)
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn de_identifier<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "task id must be a string or number, got {}",
            other
        ))),
    }
}

fn de_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => parse_date(&s),
        _ => None,
    })
}

fn de_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .or_else(|| parse_iso_duration(&s)),
        _ => None,
    })
}

fn de_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(clamp_percent(value))
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    })
}
