//! Local anaesthetic dose calculator. Results are never cached.

use axum::extract::Query;
use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::anesthetic::{self, CalcInput, DEFAULTS};
use crate::api::error::ApiError;

fn no_store(body: impl IntoResponse) -> Response {
    let mut response = body.into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// `POST /api/anestesico/calcular`
pub async fn calculate(Json(input): Json<CalcInput>) -> Result<Response, ApiError> {
    let result = anesthetic::calculate(&input)?;
    Ok(no_store(Json(result)))
}

#[derive(Deserialize)]
pub struct VasoQuery {
    #[serde(default)]
    pub vaso: String,
}

/// `GET /api/anestesico/opcoes?vaso=`
pub async fn options(Query(query): Query<VasoQuery>) -> Response {
    no_store(Json(anesthetic::conc_vaso_options(&query.vaso)))
}

/// `GET /api/anestesico/padroes`
pub async fn defaults() -> Response {
    no_store(Json(DEFAULTS))
}
