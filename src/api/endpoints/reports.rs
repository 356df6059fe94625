use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::{self, Bind};

#[derive(Debug, Serialize)]
pub struct Resumo {
    pub total_pacientes: i64,
    pub total_receitas: i64,
    pub total_documentos: i64,
}

/// `GET /api/reports/api/resumo`
pub async fn resumo(State(ctx): State<ApiContext>) -> Result<Json<Resumo>, ApiError> {
    let pacientes = ctx.core.open_db(Bind::Pacientes)?;
    let receitas = ctx.core.open_db(Bind::Receitas)?;
    Ok(Json(Resumo {
        total_pacientes: db::count_pacientes(&pacientes)?,
        total_receitas: db::count_modelos_receita(&receitas)?,
        total_documentos: db::count_documentos(&pacientes)?,
    }))
}
