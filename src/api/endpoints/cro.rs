use axum::extract::Query;
use axum::Json;

use crate::api::error::ApiError;
use crate::cro::{self, CroQuery, CroRecord};

/// `GET /api/cro/buscar?search_term=&uf=`
pub async fn search(Query(query): Query<CroQuery>) -> Result<Json<Vec<CroRecord>>, ApiError> {
    Ok(Json(cro::search(&query)?))
}
