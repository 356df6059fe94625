//! Calendar events, agenda lookups, holidays and the holiday API token.

use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agenda::{self, EventQuery, EventView};
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::{self, Bind};
use crate::holidays::{self, InvertextoClient, TOKEN_SETTING};
use crate::models::Holiday;

const PATIENT_SEARCH_LIMIT: i64 = 20;
const DENTISTS_CACHE: &str = "public, max-age=300";
const HOLIDAYS_CACHE: &str = "public, max-age=3600";

fn event_not_found() -> ApiError {
    ApiError::NotFound("Event not found".into())
}

fn cached<T: Serialize>(policy: &'static str, body: T) -> Response {
    ([(CACHE_CONTROL, HeaderValue::from_static(policy))], Json(body)).into_response()
}

// ═══════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════

/// `GET /api/agenda/events?start=&end=&q=&dentists=&include_unassigned=`
pub async fn events(
    State(ctx): State<ApiContext>,
    Query(query): Query<EventQuery>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let filter = query.to_filter(|| {
        let users = ctx.core.open_db(Bind::Users)?;
        Ok::<_, ApiError>(db::professional_ids(&users)?)
    })?;
    let conn = ctx.core.open_db(Bind::Calendario)?;
    let events = db::list_events(&conn, &filter)?;
    Ok(Json(events.into_iter().map(EventView::from).collect()))
}

/// `POST /api/agenda/events`
pub async fn create_event(
    State(ctx): State<ApiContext>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<EventView>), ApiError> {
    let mut event = agenda::new_event(&body)?;
    let row = event.clone();
    let id = ctx
        .core
        .write_blocking(Bind::Calendario, move |tx| {
            Ok::<_, ApiError>(db::insert_event(tx, &row)?)
        })
        .await?;
    event.id = id;
    ctx.core.clear_holiday_cache()?;
    Ok((StatusCode::CREATED, Json(EventView::from(event))))
}

/// `PUT /api/agenda/events/:id`: only the fields present are changed.
pub async fn update_event(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<EventView>, ApiError> {
    let event = ctx
        .core
        .write_blocking(Bind::Calendario, move |tx| {
            let mut event = db::get_event(tx, id)?.ok_or_else(event_not_found)?;
            agenda::apply_event_update(&mut event, &body);
            db::update_event(tx, &event)?;
            Ok::<_, ApiError>(event)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    Ok(Json(EventView::from(event)))
}

#[derive(Deserialize)]
pub struct ColorBody {
    pub color: Option<String>,
}

/// `PUT /api/agenda/events/:id/color`
pub async fn update_color(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<ColorBody>,
) -> Result<Json<EventView>, ApiError> {
    let event = ctx
        .core
        .write_blocking(Bind::Calendario, move |tx| {
            let mut event = db::get_event(tx, id)?.ok_or_else(event_not_found)?;
            event.color = body.color.clone();
            db::update_event(tx, &event)?;
            Ok::<_, ApiError>(event)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    Ok(Json(EventView::from(event)))
}

#[derive(Deserialize)]
pub struct NotesBody {
    pub notes: Option<String>,
}

/// `PUT /api/agenda/events/:id/notes`
pub async fn update_notes(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<NotesBody>,
) -> Result<Json<EventView>, ApiError> {
    let event = ctx
        .core
        .write_blocking(Bind::Calendario, move |tx| {
            let mut event = db::get_event(tx, id)?.ok_or_else(event_not_found)?;
            event.notes = body.notes.clone();
            db::update_event(tx, &event)?;
            Ok::<_, ApiError>(event)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    Ok(Json(EventView::from(event)))
}

/// `DELETE /api/agenda/events/:id`
pub async fn delete_event(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.core
        .write_blocking(Bind::Calendario, move |tx| {
            db::get_event(tx, id)?.ok_or_else(event_not_found)?;
            Ok::<_, ApiError>(db::delete_event(tx, id)?)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════
// Lookups
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
pub struct DentistItem {
    pub id: i64,
    pub nome: String,
    pub cro: Option<String>,
}

/// `GET /api/agenda/dentists`: conditional on `If-None-Match`.
pub async fn dentists(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let conn = ctx.core.open_db(Bind::Users)?;
    let mut users = db::list_professionals(&conn)?;
    users.sort_by_key(|u| u.display_name().to_lowercase());

    let etag = format!(
        "\"{}:{}\"",
        ctx.core.bind_mtime(Bind::Users).unwrap_or(0),
        users.len()
    );
    let etag_value =
        HeaderValue::from_str(&etag).map_err(|e| ApiError::Internal(e.to_string()))?;
    let cache = HeaderValue::from_static(DENTISTS_CACHE);

    let not_modified = headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));
    if not_modified {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [(ETAG, etag_value), (CACHE_CONTROL, cache)],
        )
            .into_response());
    }

    let items: Vec<DentistItem> = users
        .iter()
        .map(|u| DentistItem {
            id: u.id,
            nome: u.display_name().to_string(),
            cro: u.cro.clone(),
        })
        .collect();
    Ok(([(ETAG, etag_value), (CACHE_CONTROL, cache)], Json(items)).into_response())
}

#[derive(Serialize)]
pub struct PacienteBasico {
    pub id: i64,
    pub nome: String,
}

/// `GET /api/agenda/pacientes`
pub async fn pacientes(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<PacienteBasico>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let rows = db::list_pacientes_basico(&conn)?;
    Ok(Json(
        rows.into_iter()
            .map(|(id, nome)| PacienteBasico { id, nome })
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// `GET /api/agenda/pacientes/search?q=`: names starting with `q`, or
/// with a word starting with `q`.
pub async fn search_pacientes(
    State(ctx): State<ApiContext>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    if query.q.trim().is_empty() {
        return Ok(Json(Vec::new()));
    }
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    Ok(Json(db::search_nomes_por_prefixo(
        &conn,
        &query.q,
        PATIENT_SEARCH_LIMIT,
    )?))
}

#[derive(Deserialize)]
pub struct PhoneQuery {
    #[serde(default)]
    pub nome: String,
}

#[derive(Serialize)]
pub struct PhoneResponse {
    pub celular: Option<String>,
}

/// `GET /api/agenda/pacientes/telefone?nome=`
pub async fn telefone(
    State(ctx): State<ApiContext>,
    Query(query): Query<PhoneQuery>,
) -> Result<Json<PhoneResponse>, ApiError> {
    if query.nome.trim().is_empty() {
        return Ok(Json(PhoneResponse { celular: None }));
    }
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    Ok(Json(PhoneResponse {
        celular: db::find_celular_por_nome(&conn, &query.nome)?,
    }))
}

// ═══════════════════════════════════════════════════════════
// Holidays
// ═══════════════════════════════════════════════════════════

/// `GET /api/agenda/holidays`
pub async fn holidays(State(ctx): State<ApiContext>) -> Result<Json<Vec<Holiday>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Calendario)?;
    Ok(Json(db::list_holidays(&conn)?))
}

#[derive(Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
}

/// `GET /api/agenda/holidays/range?start=YYYY-MM-DD&end=YYYY-MM-DD`
pub async fn holidays_range(
    State(ctx): State<ApiContext>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let conn = ctx.core.open_db(Bind::Calendario)?;
    let data = ctx
        .core
        .holidays()?
        .range(&conn, query.start.trim(), query.end.trim())?;
    Ok(cached(HOLIDAYS_CACHE, data))
}

/// `GET /api/agenda/holidays/year/:year`: a non-numeric year is empty.
pub async fn holidays_year(
    State(ctx): State<ApiContext>,
    Path(year): Path<String>,
) -> Result<Response, ApiError> {
    let year: i32 = year.trim().parse().unwrap_or(0);
    let conn = ctx.core.open_db(Bind::Calendario)?;
    let data = ctx.core.holidays()?.year(&conn, year)?;
    Ok(cached(HOLIDAYS_CACHE, data))
}

/// `POST /api/agenda/holidays`
pub async fn create_holiday(
    State(ctx): State<ApiContext>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Holiday>), ApiError> {
    let holiday = holidays::holiday_from_body(None, &body)?;
    let row = holiday.clone();
    ctx.core
        .write_blocking(Bind::Calendario, move |tx| {
            Ok::<_, ApiError>(db::upsert_holiday(tx, &row)?)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    Ok((StatusCode::CREATED, Json(holiday)))
}

/// `PUT /api/agenda/holidays/:date`
pub async fn update_holiday(
    State(ctx): State<ApiContext>,
    Path(date): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Holiday>, ApiError> {
    let holiday = holidays::holiday_from_body(Some(&date), &body)?;
    let row = holiday.clone();
    ctx.core
        .write_blocking(Bind::Calendario, move |tx| {
            db::get_holiday(tx, &date)?
                .ok_or_else(|| ApiError::NotFound("Feriado não encontrado".into()))?;
            Ok::<_, ApiError>(db::upsert_holiday(tx, &row)?)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    Ok(Json(holiday))
}

/// `POST /api/agenda/cache/clear`
pub async fn clear_cache(State(ctx): State<ApiContext>) -> Result<StatusCode, ApiError> {
    ctx.core.clear_holiday_cache()?;
    tracing::info!("Holiday cache cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct TokenStatus {
    #[serde(rename = "hasToken")]
    pub has_token: bool,
}

/// `GET /api/agenda/holidays/token`: never returns the token itself.
pub async fn token_status(State(ctx): State<ApiContext>) -> Result<Json<TokenStatus>, ApiError> {
    let conn = ctx.core.open_db(Bind::Calendario)?;
    let has_token = db::get_setting(&conn, TOKEN_SETTING)?
        .is_some_and(|t| !t.trim().is_empty());
    Ok(Json(TokenStatus { has_token }))
}

#[derive(Deserialize)]
pub struct TokenBody {
    #[serde(default)]
    pub token: String,
}

/// `POST /api/agenda/holidays/token`
pub async fn save_token(
    State(ctx): State<ApiContext>,
    Json(body): Json<TokenBody>,
) -> Result<Json<TokenStatus>, ApiError> {
    let token = body.token.trim().to_string();
    if token.is_empty() {
        return Err(ApiError::BadRequest("Token vazio".into()));
    }
    ctx.core
        .write_blocking(Bind::Calendario, move |tx| {
            Ok::<_, ApiError>(db::set_setting(tx, TOKEN_SETTING, &token)?)
        })
        .await?;
    Ok(Json(TokenStatus { has_token: true }))
}

/// `DELETE /api/agenda/holidays/token`
pub async fn delete_token(State(ctx): State<ApiContext>) -> Result<Json<TokenStatus>, ApiError> {
    ctx.core
        .write_blocking(Bind::Calendario, |tx| {
            Ok::<_, ApiError>(db::delete_setting(tx, TOKEN_SETTING)?)
        })
        .await?;
    Ok(Json(TokenStatus { has_token: false }))
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub year: i32,
    pub count: usize,
}

fn year_field(value: Option<&Value>) -> i32 {
    match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// `POST /api/agenda/holidays/refresh {year, state?}`: downloads the
/// year from the holiday API and replaces the stored rows.
pub async fn refresh(
    State(ctx): State<ApiContext>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let year = year_field(body.get("year"));
    let state = body
        .get("state")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase);

    // Download once; only the store below is replayed on contention.
    let core = ctx.core.clone();
    let fetched = tokio::task::spawn_blocking(move || -> Result<Vec<Holiday>, ApiError> {
        let conn = core.open_db(Bind::Calendario)?;
        let token = db::get_setting(&conn, TOKEN_SETTING)?;
        let client = InvertextoClient::new(&core.config.invertexto_base_url)?;
        Ok(holidays::fetch_holidays(
            &client,
            year,
            state.as_deref(),
            token.as_deref(),
        )?)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let count = ctx
        .core
        .write_blocking(Bind::Calendario, move |tx| {
            Ok::<_, ApiError>(db::replace_year_holidays(tx, year, &fetched)?)
        })
        .await?;
    ctx.core.clear_holiday_cache()?;
    tracing::info!(year, count, "Holidays refreshed");
    Ok(Json(RefreshResponse { year, count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn year_field_accepts_numbers_and_strings() {
        assert_eq!(year_field(Some(&json!(2025))), 2025);
        assert_eq!(year_field(Some(&json!(" 2024 "))), 2024);
        assert_eq!(year_field(Some(&json!("abc"))), 0);
        assert_eq!(year_field(None), 0);
    }
}
