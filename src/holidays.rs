//! Holiday lookups with an in-memory TTL cache, and the yearly refresh
//! from the Invertexto public-holiday API.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{Map, Value};

use crate::db::{self, DatabaseError};
use crate::models::{now, Holiday};

/// Setting key holding the Invertexto API token.
pub const TOKEN_SETTING: &str = "invertexto_token";
pub const HOLIDAY_CACHE_TTL: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const SOURCE: &str = "invertexto";

#[derive(Debug, thiserror::Error)]
pub enum HolidayError {
    #[error("Ano inválido")]
    InvalidYear,

    #[error("Token não configurado")]
    MissingToken,

    #[error("Campos obrigatórios ausentes")]
    MissingFields,

    #[error("Falha de requisição: {0}")]
    Request(String),

    #[error("Não autorizado (401)")]
    Unauthorized,

    #[error("Parâmetros inválidos (400)")]
    BadParameters,

    #[error("Limite excedido (429)")]
    RateLimited,

    #[error("Erro {0} da API")]
    Api(u16),

    #[error("JSON inválido")]
    InvalidJson,

    #[error("Resposta inesperada")]
    UnexpectedResponse,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl HolidayError {
    /// Problems with the caller's input rather than with the upstream API.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidYear | Self::MissingToken | Self::MissingFields
        )
    }

    fn from_status(code: u16) -> Self {
        match code {
            401 => Self::Unauthorized,
            400 => Self::BadParameters,
            429 => Self::RateLimited,
            other => Self::Api(other),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    data: Vec<Holiday>,
    at: Instant,
}

/// Range and year query results, kept for `ttl` and dropped on every write.
#[derive(Debug)]
pub struct HolidayCache {
    ttl: Duration,
    years: HashMap<i32, CacheEntry>,
    ranges: HashMap<(String, String), CacheEntry>,
}

impl Default for HolidayCache {
    fn default() -> Self {
        Self::new(HOLIDAY_CACHE_TTL)
    }
}

fn is_iso_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

impl HolidayCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            years: HashMap::new(),
            ranges: HashMap::new(),
        }
    }

    fn fresh(&self, entry: &CacheEntry) -> bool {
        entry.at.elapsed() <= self.ttl
    }

    /// Drop expired entries so distinct queries do not pile up.
    fn evict_stale(&mut self) {
        let ttl = self.ttl;
        self.years.retain(|_, e| e.at.elapsed() <= ttl);
        self.ranges.retain(|_, e| e.at.elapsed() <= ttl);
    }

    /// Holidays between two ISO dates (inclusive). Malformed bounds yield nothing.
    pub fn range(
        &mut self,
        conn: &Connection,
        start: &str,
        end: &str,
    ) -> Result<Vec<Holiday>, DatabaseError> {
        if !is_iso_date(start) || !is_iso_date(end) {
            return Ok(Vec::new());
        }
        let key = (start.to_string(), end.to_string());
        if let Some(entry) = self.ranges.get(&key).filter(|e| self.fresh(e)) {
            return Ok(entry.data.clone());
        }
        let data = db::list_holidays_between(conn, start, end)?;
        self.evict_stale();
        self.ranges.insert(
            key,
            CacheEntry {
                data: data.clone(),
                at: Instant::now(),
            },
        );
        Ok(data)
    }

    pub fn year(&mut self, conn: &Connection, year: i32) -> Result<Vec<Holiday>, DatabaseError> {
        if year <= 0 {
            return Ok(Vec::new());
        }
        if let Some(entry) = self.years.get(&year).filter(|e| self.fresh(e)) {
            return Ok(entry.data.clone());
        }
        let data = db::list_holidays_for_year(conn, year)?;
        self.evict_stale();
        self.years.insert(
            year,
            CacheEntry {
                data: data.clone(),
                at: Instant::now(),
            },
        );
        Ok(data)
    }

    pub fn clear(&mut self) {
        self.years.clear();
        self.ranges.clear();
    }

    pub fn len(&self) -> usize {
        self.years.len() + self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remote list of holidays for one year.
pub trait HolidaySource {
    fn fetch(&self, year: i32, state: Option<&str>, token: &str) -> Result<Value, HolidayError>;
}

/// Blocking client for `GET <base>/<year>?token=..&state=..`.
pub struct InvertextoClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl InvertextoClient {
    pub fn new(base_url: &str) -> Result<Self, HolidayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| HolidayError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl HolidaySource for InvertextoClient {
    fn fetch(&self, year: i32, state: Option<&str>, token: &str) -> Result<Value, HolidayError> {
        let url = format!("{}/{year}", self.base_url);
        let mut query = vec![("token", token)];
        if let Some(state) = state {
            query.push(("state", state));
        }
        let response = self
            .client
            .get(&url)
            .query(&query)
            .bearer_auth(token)
            .send()
            .map_err(|e| HolidayError::Request(e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 200 {
            return Err(HolidayError::from_status(status.as_u16()));
        }
        let body = response
            .text()
            .map_err(|e| HolidayError::Request(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        serde_json::from_str(&body).map_err(|_| HolidayError::InvalidJson)
    }
}

fn text_field(item: &Map<String, Value>, key: &str) -> Option<String> {
    let raw = match item.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    (!raw.is_empty()).then_some(raw)
}

/// Convert an API payload into rows for `year`. Items lacking a date or
/// a name are skipped.
pub fn parse_holidays(
    payload: Value,
    year: i32,
    state: Option<&str>,
) -> Result<Vec<Holiday>, HolidayError> {
    let Value::Array(items) = payload else {
        return Err(HolidayError::UnexpectedResponse);
    };
    let stamp = now();
    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            Some(Holiday {
                date: text_field(item, "date")?,
                name: text_field(item, "name")?,
                kind: text_field(item, "type"),
                level: text_field(item, "level"),
                state: state.map(str::to_string),
                year,
                source: SOURCE.to_string(),
                updated_at: Some(stamp),
            })
        })
        .collect())
}

/// Download and parse the holidays of `year`. Storing them is left to
/// the caller, so a replayed write never repeats the request.
pub fn fetch_holidays(
    source: &dyn HolidaySource,
    year: i32,
    state: Option<&str>,
    token: Option<&str>,
) -> Result<Vec<Holiday>, HolidayError> {
    if year <= 0 {
        return Err(HolidayError::InvalidYear);
    }
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(HolidayError::MissingToken)?;
    let payload = source.fetch(year, state, token)?;
    let holidays = parse_holidays(payload, year, state)?;
    tracing::debug!(year, count = holidays.len(), "Holidays downloaded");
    Ok(holidays)
}

fn year_of(value: Option<&Value>) -> Option<i32> {
    match value? {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn opt_text(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Holiday from a create (`date` in the body) or update (`date` from the
/// path) request. `name` and `year` are required in both.
pub fn holiday_from_body(
    path_date: Option<&str>,
    data: &Map<String, Value>,
) -> Result<Holiday, HolidayError> {
    let date = match path_date {
        Some(d) => d.to_string(),
        None => opt_text(data, "date").ok_or(HolidayError::MissingFields)?,
    };
    let name = opt_text(data, "name").ok_or(HolidayError::MissingFields)?;
    let year = year_of(data.get("year")).ok_or(HolidayError::MissingFields)?;
    Ok(Holiday {
        date,
        name,
        kind: opt_text(data, "type"),
        level: opt_text(data, "level"),
        state: opt_text(data, "state"),
        year,
        source: opt_text(data, "source").unwrap_or_else(|| SOURCE.to_string()),
        updated_at: Some(now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};
    use serde_json::json;
    use std::cell::RefCell;

    struct MockSource {
        reply: RefCell<Option<Result<Value, HolidayError>>>,
        calls: RefCell<Vec<(i32, Option<String>, String)>>,
    }

    impl MockSource {
        fn new(reply: Result<Value, HolidayError>) -> Self {
            Self {
                reply: RefCell::new(Some(reply)),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl HolidaySource for MockSource {
        fn fetch(&self, year: i32, state: Option<&str>, token: &str) -> Result<Value, HolidayError> {
            self.calls
                .borrow_mut()
                .push((year, state.map(String::from), token.to_string()));
            self.reply
                .borrow_mut()
                .take()
                .unwrap_or(Err(HolidayError::Api(500)))
        }
    }

    fn holiday(date: &str, year: i32) -> Holiday {
        Holiday {
            date: date.into(),
            name: "Feriado".into(),
            kind: None,
            level: None,
            state: None,
            year,
            source: SOURCE.into(),
            updated_at: None,
        }
    }

    #[test]
    fn downloaded_year_replaces_stored_one() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        db::upsert_holiday(&conn, &holiday("2024-02-13", 2024)).unwrap();
        let source = MockSource::new(Ok(json!([
            {"date": "2024-01-01", "name": " Confraternização ", "type": "feriado", "level": " nacional "},
            {"date": "2024-04-21", "name": "Tiradentes", "type": ""},
            {"date": "", "name": "Sem data"},
            {"date": "2024-06-01"}
        ])));

        let fetched = fetch_holidays(&source, 2024, Some("SP"), Some("tok")).unwrap();
        assert_eq!(fetched.len(), 2);
        let count = db::replace_year_holidays(&conn, 2024, &fetched).unwrap();
        assert_eq!(count, 2);
        assert_eq!(
            source.calls.borrow()[0],
            (2024, Some("SP".to_string()), "tok".to_string())
        );

        let stored = db::list_holidays_for_year(&conn, 2024).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].name, "Confraternização");
        assert_eq!(stored[0].level.as_deref(), Some("nacional"));
        assert_eq!(stored[1].kind, None);
        assert_eq!(stored[1].state.as_deref(), Some("SP"));
        assert!(db::get_holiday(&conn, "2024-02-13").unwrap().is_none());
    }

    #[test]
    fn fetch_validates_before_calling_out() {
        let source = MockSource::new(Ok(json!([])));
        assert!(matches!(
            fetch_holidays(&source, 0, None, Some("t")),
            Err(HolidayError::InvalidYear)
        ));
        assert!(matches!(
            fetch_holidays(&source, 2024, None, Some("  ")),
            Err(HolidayError::MissingToken)
        ));
        assert!(source.calls.borrow().is_empty());
    }

    #[test]
    fn non_list_payload_is_unexpected() {
        let source = MockSource::new(Ok(json!({"error": "x"})));
        let err = fetch_holidays(&source, 2024, None, Some("t")).unwrap_err();
        assert_eq!(err.to_string(), "Resposta inesperada");
        assert!(!err.is_client_error());
    }

    #[test]
    fn status_messages() {
        assert_eq!(HolidayError::from_status(401).to_string(), "Não autorizado (401)");
        assert_eq!(HolidayError::from_status(400).to_string(), "Parâmetros inválidos (400)");
        assert_eq!(HolidayError::from_status(429).to_string(), "Limite excedido (429)");
        assert_eq!(HolidayError::from_status(503).to_string(), "Erro 503 da API");
    }

    #[test]
    fn cache_serves_stale_data_until_cleared() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        db::upsert_holiday(&conn, &holiday("2024-01-01", 2024)).unwrap();
        let mut cache = HolidayCache::default();

        assert_eq!(cache.year(&conn, 2024).unwrap().len(), 1);
        assert_eq!(cache.range(&conn, "2024-01-01", "2024-12-31").unwrap().len(), 1);
        db::upsert_holiday(&conn, &holiday("2024-04-21", 2024)).unwrap();
        assert_eq!(cache.year(&conn, 2024).unwrap().len(), 1);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.year(&conn, 2024).unwrap().len(), 2);
    }

    #[test]
    fn zero_ttl_always_reloads() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        let mut cache = HolidayCache::new(Duration::ZERO);
        assert!(cache.year(&conn, 2024).unwrap().is_empty());
        db::upsert_holiday(&conn, &holiday("2024-01-01", 2024)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.year(&conn, 2024).unwrap().len(), 1);
    }

    #[test]
    fn expired_entries_are_evicted_on_insert() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        let mut cache = HolidayCache::new(Duration::from_millis(20));
        cache.range(&conn, "2024-01-01", "2024-01-31").unwrap();
        cache.range(&conn, "2024-02-01", "2024-02-29").unwrap();
        cache.year(&conn, 2023).unwrap();
        assert_eq!(cache.len(), 3);

        std::thread::sleep(Duration::from_millis(40));
        cache.range(&conn, "2024-03-01", "2024-03-31").unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn malformed_queries_are_empty() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        let mut cache = HolidayCache::default();
        assert!(cache.range(&conn, "2024-1-1x", "2024-12-31").unwrap().is_empty());
        assert!(cache.year(&conn, -1).unwrap().is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn body_requires_name_and_year() {
        let ok = holiday_from_body(
            None,
            json!({"date": "2024-11-20", "name": "Consciência Negra", "year": "2024"})
                .as_object()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(ok.year, 2024);
        assert_eq!(ok.source, "invertexto");

        let missing = holiday_from_body(Some("2024-11-20"), json!({"name": "x"}).as_object().unwrap());
        assert!(matches!(missing, Err(HolidayError::MissingFields)));
    }
}
