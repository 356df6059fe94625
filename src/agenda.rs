//! Calendar rules: input date parsing, event interval defaults, the
//! all-day flag and the listing filter built from query parameters.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::{EventFilter, ProfessionalFilter};
use crate::models::CalendarEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgendaError {
    #[error("Start inválido")]
    InvalidStart,
}

/// A parsed input value and whether it carried only a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDateTime {
    pub value: NaiveDateTime,
    pub date_only: bool,
}

const TIMED_BR: [&str; 2] = ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];
const TIMED_ISO: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

fn date_only(raw: &str, fmt: &str) -> Option<ParsedDateTime> {
    NaiveDate::parse_from_str(raw, fmt).ok().map(|d| ParsedDateTime {
        value: d.and_time(NaiveTime::MIN),
        date_only: true,
    })
}

fn timed(raw: &str, formats: &[&str]) -> Option<ParsedDateTime> {
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|value| ParsedDateTime {
                value,
                date_only: false,
            })
    })
}

/// Parse a date or datetime typed by a user or sent by the calendar widget.
///
/// Brazilian formats are tried first, then ISO. Offsets and `Z` are
/// accepted and dropped, keeping the wall-clock time as written.
pub fn parse_input_datetime(raw: &str) -> Option<ParsedDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(p) = timed(s, &TIMED_BR).or_else(|| date_only(s, "%d/%m/%Y")) {
        return Some(p);
    }
    if let Some(p) = timed(s, &TIMED_ISO).or_else(|| date_only(s, "%Y-%m-%d")) {
        return Some(p);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(ParsedDateTime {
            value: dt.naive_local(),
            date_only: false,
        });
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ParsedDateTime {
            value: dt.naive_local(),
            date_only: false,
        });
    }
    timed(s, &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"])
}

pub fn normalize_for_storage(dt: NaiveDateTime, date_only: bool) -> String {
    if date_only {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

fn is_midnight(dt: &NaiveDateTime) -> bool {
    dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0
}

/// Both stored values date-only, or both at midnight a whole number of days apart.
pub fn is_all_day(start: &str, end: Option<&str>) -> bool {
    let Some(end) = end else {
        return false;
    };
    let (Some(s), Some(e)) = (parse_input_datetime(start), parse_input_datetime(end)) else {
        return false;
    };
    if start.len() == 10 && end.len() == 10 {
        return true;
    }
    is_midnight(&s.value)
        && is_midnight(&e.value)
        && (e.value - s.value).num_seconds() % 86_400 == 0
}

/// Event as sent to the calendar widget.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: CalendarEvent,
    #[serde(rename = "allDay")]
    pub all_day: bool,
}

impl From<CalendarEvent> for EventView {
    fn from(event: CalendarEvent) -> Self {
        let all_day = is_all_day(&event.start, event.end.as_deref());
        Self { event, all_day }
    }
}

/// Fill in a missing or inverted end: one day after a date-only start,
/// one hour after a timed one.
fn resolve_interval(
    start: ParsedDateTime,
    end: Option<ParsedDateTime>,
) -> (ParsedDateTime, ParsedDateTime) {
    let end = match end {
        Some(e) if e.value > start.value && (!start.date_only || e.date_only) => e,
        _ if start.date_only => ParsedDateTime {
            value: start.value + Duration::days(1),
            date_only: true,
        },
        _ => ParsedDateTime {
            value: start.value + Duration::hours(1),
            date_only: false,
        },
    };
    (start, end)
}

fn raw_str(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn title_of(data: &Map<String, Value>) -> String {
    raw_str(data, "title").unwrap_or_default().trim().to_string()
}

/// Only non-negative integers (as numbers or digit strings) are kept.
pub fn parse_profissional_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|v| i64::try_from(v).ok()),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

fn parsed_field(data: &Map<String, Value>, key: &str) -> Option<ParsedDateTime> {
    raw_str(data, key).and_then(|raw| parse_input_datetime(&raw))
}

/// Build a new event from a JSON body.
pub fn new_event(data: &Map<String, Value>) -> Result<CalendarEvent, AgendaError> {
    let start = parsed_field(data, "start").ok_or(AgendaError::InvalidStart)?;
    let (start, end) = resolve_interval(start, parsed_field(data, "end"));
    Ok(CalendarEvent {
        id: 0,
        title: title_of(data),
        start: normalize_for_storage(start.value, start.date_only),
        end: Some(normalize_for_storage(end.value, end.date_only)),
        color: raw_str(data, "color"),
        notes: raw_str(data, "notes"),
        profissional_id: parse_profissional_id(data.get("profissional_id")),
    })
}

/// Apply a partial update. Only keys present in `data` are touched; the
/// interval is recomputed when a valid `start` is sent.
pub fn apply_event_update(event: &mut CalendarEvent, data: &Map<String, Value>) {
    if data.contains_key("title") {
        event.title = title_of(data);
    }
    if data.contains_key("color") {
        event.color = raw_str(data, "color");
    }
    if data.contains_key("notes") {
        event.notes = raw_str(data, "notes");
    }
    if data.contains_key("profissional_id") {
        event.profissional_id = parse_profissional_id(data.get("profissional_id"));
    }
    if let Some(start) = parsed_field(data, "start") {
        let (start, end) = resolve_interval(start, parsed_field(data, "end"));
        event.start = normalize_for_storage(start.value, start.date_only);
        event.end = Some(normalize_for_storage(end.value, end.date_only));
    }
}

const COLOR_WORDS: &[(&str, &[&str])] = &[
    ("vermelho", &["#e11d48"]),
    ("rosa", &["#f43f5e", "#f472b6"]),
    ("laranja", &["#f59e42"]),
    ("amarelo", &["#fbbf24"]),
    ("verde", &["#22c55e"]),
    ("verde-agua", &["#10b981"]),
    ("verde agua", &["#10b981"]),
    ("azul", &["#2563eb"]),
    ("azul-claro", &["#0ea5e9"]),
    ("roxo", &["#6366f1"]),
    ("roxo-escuro", &["#a21caf"]),
    ("cinza", &["#64748b"]),
];

/// Palette colors named by a search query, plus a literal `#rgb`/`#rrggbb`.
pub fn color_hexes(query: &str) -> Vec<String> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return Vec::new();
    }
    let mut hexes: Vec<String> = Vec::new();
    let mut push = |h: &str| {
        if !hexes.iter().any(|x| x == h) {
            hexes.push(h.to_string());
        }
    };
    for (word, values) in COLOR_WORDS {
        if q.contains(word) {
            values.iter().for_each(|v| push(*v));
        }
    }
    if q.starts_with('#') && matches!(q.chars().count(), 4 | 7) {
        push(q.as_str());
    }
    hexes
}

/// Query string of the event feed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub q: Option<String>,
    pub dentists: Option<String>,
    pub include_unassigned: Option<String>,
}

fn trimmed(v: &Option<String>) -> &str {
    v.as_deref().map(str::trim).unwrap_or("")
}

impl EventQuery {
    pub fn include_unassigned(&self) -> bool {
        matches!(trimmed(&self.include_unassigned), "1" | "true" | "True")
    }

    /// Translate the query into a repository filter. `valid_professionals`
    /// is only consulted for the default view, which shows events left
    /// assigned to someone who is no longer an active professional.
    pub fn to_filter<E>(
        &self,
        valid_professionals: impl FnOnce() -> Result<Vec<i64>, E>,
    ) -> Result<EventFilter, E> {
        let (start, end) = (trimmed(&self.start), trimmed(&self.end));
        let range = (start.len() >= 10 && end.len() >= 10)
            .then(|| (start.to_string(), end.to_string()));

        let text = trimmed(&self.q);
        let (text, color_hexes) = if text.is_empty() {
            (None, Vec::new())
        } else {
            (Some(text.to_string()), color_hexes(text))
        };

        let include_unassigned = self.include_unassigned();
        let dentists = trimmed(&self.dentists);
        let professional = if !dentists.is_empty() {
            let ids: Vec<i64> = dentists
                .split(',')
                .map(str::trim)
                .filter(|x| !x.is_empty() && x.chars().all(|c| c.is_ascii_digit()))
                .filter_map(|x| x.parse().ok())
                .collect();
            if !ids.is_empty() {
                ProfessionalFilter::Only {
                    ids,
                    include_unassigned,
                }
            } else if include_unassigned {
                ProfessionalFilter::UnassignedOnly
            } else {
                ProfessionalFilter::Any
            }
        } else if include_unassigned {
            ProfessionalFilter::UnassignedOnly
        } else {
            ProfessionalFilter::Orphaned {
                valid_ids: valid_professionals()?,
            }
        };

        Ok(EventFilter {
            range,
            text,
            color_hexes,
            professional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("object expected"),
        }
    }

    fn stored(raw: &str) -> String {
        let p = parse_input_datetime(raw).unwrap();
        normalize_for_storage(p.value, p.date_only)
    }

    #[test]
    fn parses_brazilian_and_iso_inputs() {
        assert_eq!(stored("05/03/2024 14:30"), "2024-03-05T14:30:00");
        assert_eq!(stored("05/03/2024 14:30:15"), "2024-03-05T14:30:15");
        assert_eq!(stored("05/03/2024"), "2024-03-05");
        assert_eq!(stored("2024-03-05T14:30"), "2024-03-05T14:30:00");
        assert_eq!(stored("2024-03-05 14:30:15"), "2024-03-05T14:30:15");
        assert_eq!(stored("2024-03-05"), "2024-03-05");
        assert!(parse_input_datetime("ontem").is_none());
        assert!(parse_input_datetime("  ").is_none());
    }

    #[test]
    fn offsets_keep_wall_clock() {
        assert_eq!(stored("2024-03-05T14:30:00Z"), "2024-03-05T14:30:00");
        assert_eq!(stored("2024-03-05T14:30:00.250-03:00"), "2024-03-05T14:30:00");
        assert_eq!(stored("2024-03-05T14:30:00.5"), "2024-03-05T14:30:00");
    }

    #[test]
    fn all_day_detection() {
        assert!(is_all_day("2024-03-05", Some("2024-03-06")));
        assert!(is_all_day("2024-03-05T00:00:00", Some("2024-03-07T00:00:00")));
        assert!(!is_all_day("2024-03-05T00:00:00", Some("2024-03-05T12:00:00")));
        assert!(!is_all_day("2024-03-05T09:00:00", Some("2024-03-06T09:00:00")));
        assert!(!is_all_day("2024-03-05", None));
    }

    #[test]
    fn create_rejects_bad_start() {
        assert_eq!(
            new_event(&body(json!({"title": "x", "start": "amanhã"}))),
            Err(AgendaError::InvalidStart)
        );
        assert_eq!(
            new_event(&body(json!({"title": "x"}))),
            Err(AgendaError::InvalidStart)
        );
    }

    #[test]
    fn create_defaults_end() {
        let ev = new_event(&body(json!({"title": " Consulta ", "start": "2024-03-05"}))).unwrap();
        assert_eq!(ev.title, "Consulta");
        assert_eq!(ev.end.as_deref(), Some("2024-03-06"));

        let ev = new_event(&body(json!({"start": "2024-03-05T09:00"}))).unwrap();
        assert_eq!(ev.end.as_deref(), Some("2024-03-05T10:00:00"));

        // End before start is replaced
        let ev = new_event(&body(
            json!({"start": "2024-03-05T09:00", "end": "2024-03-05T08:00"}),
        ))
        .unwrap();
        assert_eq!(ev.end.as_deref(), Some("2024-03-05T10:00:00"));

        // Timed end on a date-only start is not kept
        let ev = new_event(&body(
            json!({"start": "2024-03-05", "end": "2024-03-08T10:00"}),
        ))
        .unwrap();
        assert_eq!(ev.end.as_deref(), Some("2024-03-06"));

        let ev = new_event(&body(json!({"start": "2024-03-05", "end": "2024-03-08"}))).unwrap();
        assert_eq!(ev.end.as_deref(), Some("2024-03-08"));
    }

    #[test]
    fn profissional_id_accepts_only_non_negative_integers() {
        assert_eq!(parse_profissional_id(Some(&json!(3))), Some(3));
        assert_eq!(parse_profissional_id(Some(&json!("12"))), Some(12));
        assert_eq!(parse_profissional_id(Some(&json!(-1))), None);
        assert_eq!(parse_profissional_id(Some(&json!("1a"))), None);
        assert_eq!(parse_profissional_id(Some(&json!(""))), None);
        assert_eq!(parse_profissional_id(Some(&json!(true))), None);
        assert_eq!(parse_profissional_id(Some(&json!(1.5))), None);
        assert_eq!(parse_profissional_id(None), None);
    }

    #[test]
    fn update_touches_only_present_keys() {
        let mut ev = new_event(&body(json!({
            "title": "A", "start": "2024-03-05T09:00", "color": "#2563eb",
            "notes": "n", "profissional_id": 2
        })))
        .unwrap();
        apply_event_update(&mut ev, &body(json!({"notes": null})));
        assert_eq!(ev.title, "A");
        assert_eq!(ev.color.as_deref(), Some("#2563eb"));
        assert_eq!(ev.notes, None);
        assert_eq!(ev.profissional_id, Some(2));

        apply_event_update(&mut ev, &body(json!({"profissional_id": "x", "end": "2024-03-09"})));
        assert_eq!(ev.profissional_id, None);
        // End alone does not move the event
        assert_eq!(ev.end.as_deref(), Some("2024-03-05T10:00:00"));

        apply_event_update(&mut ev, &body(json!({"start": "10/03/2024"})));
        assert_eq!(ev.start, "2024-03-10");
        assert_eq!(ev.end.as_deref(), Some("2024-03-11"));
    }

    #[test]
    fn color_words_and_hex() {
        assert_eq!(color_hexes("Rosa"), vec!["#f43f5e", "#f472b6"]);
        assert_eq!(color_hexes("verde agua"), vec!["#22c55e", "#10b981"]);
        assert_eq!(color_hexes("#ABC"), vec!["#abc"]);
        assert!(color_hexes("#abcd").is_empty());
        assert!(color_hexes("limpeza").is_empty());
    }

    #[test]
    fn view_serializes_all_day() {
        let ev = new_event(&body(json!({"title": "F", "start": "2024-03-05"}))).unwrap();
        let v = serde_json::to_value(EventView::from(ev)).unwrap();
        assert_eq!(v["allDay"], json!(true));
        assert_eq!(v["start"], json!("2024-03-05"));
        assert_eq!(v["title"], json!("F"));
    }

    fn query(dentists: Option<&str>, include: Option<&str>) -> EventQuery {
        EventQuery {
            start: Some("2024-03-01".into()),
            end: Some("2024-04".into()),
            q: Some("  ".into()),
            dentists: dentists.map(Into::into),
            include_unassigned: include.map(Into::into),
        }
    }

    #[test]
    fn filter_from_query() {
        let never = || -> Result<Vec<i64>, ()> { panic!("not consulted") };

        let f = query(Some("1, 2,x"), Some("true")).to_filter(never).unwrap();
        assert_eq!(
            f.professional,
            ProfessionalFilter::Only {
                ids: vec![1, 2],
                include_unassigned: true
            }
        );
        // Short bound disables the range, blank query disables text
        assert!(f.range.is_none());
        assert!(f.text.is_none());

        let f = query(Some("x"), None).to_filter(never).unwrap();
        assert_eq!(f.professional, ProfessionalFilter::Any);

        let f = query(None, Some("1")).to_filter(never).unwrap();
        assert_eq!(f.professional, ProfessionalFilter::UnassignedOnly);

        let f = query(None, None).to_filter(|| Ok::<_, ()>(vec![4])).unwrap();
        assert_eq!(
            f.professional,
            ProfessionalFilter::Orphaned { valid_ids: vec![4] }
        );
    }
}
