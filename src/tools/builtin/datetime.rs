use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::tools::handler::ToolHandler;
use crate::tools::result::ToolError;
use crate::types::ToolDeclaration;

pub const NAME: &str = "get_current_datetime";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeReport {
    pub full_date_time: String,
    pub date: String,
    pub time: String,
    pub iso_string: String,
    pub time_zone: String,
}

impl DateTimeReport {
    pub fn at(now: DateTime<Local>, time_zone: impl Into<String>) -> Self {
        Self {
            full_date_time: now.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
            date: now.format("%-m/%-d/%Y").to_string(),
            time: now.format("%-I:%M:%S %p").to_string(),
            iso_string: now
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            time_zone: time_zone.into(),
        }
    }

    pub fn now() -> Self {
        Self::at(Local::now(), resolve_time_zone())
    }
}

/// IANA name of the system zone: `$TZ`, then `/etc/timezone`, then the
/// `/etc/localtime` link target. Falls back to `UTC`.
pub fn resolve_time_zone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    if let Ok(contents) = std::fs::read_to_string("/etc/timezone") {
        let tz = contents.trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    std::fs::read_link("/etc/localtime")
        .ok()
        .and_then(|target| zone_from_link(&target))
        .unwrap_or_else(|| "UTC".to_string())
}

fn zone_from_link(target: &Path) -> Option<String> {
    let target = target.to_str()?;
    let (_, zone) = target.split_once("zoneinfo/")?;
    (!zone.is_empty()).then(|| zone.to_string())
}

pub fn declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        NAME,
        "When asked for the current date, the current time, or what day it is, use this tool. \
         It returns the current date and time along with the system time zone.",
        json!({"type": "object", "properties": {}}),
    )
}

pub struct CurrentDateTime;

#[async_trait]
impl ToolHandler for CurrentDateTime {
    async fn call(&self, _arguments: &Map<String, Value>) -> Result<Value, ToolError> {
        serde_json::to_value(DateTimeReport::now())
            .map_err(|e| ToolError::execution("Failed to read current time", e))
    }
}
