//! Certificates of absence.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{pdf_attachment, ApiContext};
use crate::certificates::{self, AtestadoInput, LIST_LIMIT};
use crate::db::{self, Bind};
use crate::models::Atestado;

fn atestado_not_found() -> ApiError {
    ApiError::NotFound("Atestado não encontrado".into())
}

/// `GET /api/atestados`: newest first.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<Atestado>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    Ok(Json(db::list_atestados(&conn, LIST_LIMIT)?))
}

/// `POST /api/atestados`
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(input): Json<AtestadoInput>,
) -> Result<(StatusCode, Json<Atestado>), ApiError> {
    let (paciente, dias) = input.validate()?;
    let paciente = paciente.to_string();
    let atestado = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            let id = db::insert_atestado(tx, &paciente, dias)?;
            db::get_atestado(tx, id)?.ok_or_else(atestado_not_found)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(atestado)))
}

/// `GET /api/atestados/:id/pdf`
pub async fn pdf(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let atestado = {
        let conn = ctx.core.open_db(Bind::Pacientes)?;
        db::get_atestado(&conn, id)?.ok_or_else(atestado_not_found)?
    };
    let clinica = ctx.core.clinica().await?;
    let (bytes, filename) = certificates::certificate_pdf(&atestado, &clinica)?;
    Ok(pdf_attachment(bytes, &filename))
}
