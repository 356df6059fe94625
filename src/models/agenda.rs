use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Stored event; `start`/`end` keep their storage format
/// (`YYYY-MM-DD` for all-day, `YYYY-MM-DDTHH:MM:SS` otherwise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub start: String,
    pub end: Option<String>,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub profissional_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holiday {
    pub date: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub level: Option<String>,
    pub state: Option<String>,
    pub year: i32,
    pub source: String,
    pub updated_at: Option<NaiveDateTime>,
}
