//! Prescriptions: templates, the medication reference and PDF issuing.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{pdf_attachment, ApiContext, UserContext};
use crate::db::{self, Bind};
use crate::models::{Clinica, Medicamento, ModeloReceita};
use crate::prescriptions::{
    self, DentistaDados, MedicamentoItem, ModeloInput, ReceitaInput, QUICK_SEARCH_LIMIT,
};

const INDEX_MEDICAMENTOS: i64 = 10;

fn modelo_not_found() -> ApiError {
    ApiError::NotFound("Modelo não encontrado".into())
}

fn owned((titulo, conteudo): (&str, &str)) -> (String, String) {
    (titulo.to_string(), conteudo.to_string())
}

#[derive(Serialize)]
pub struct ReceitasIndex {
    pub modelos: Vec<ModeloReceita>,
    pub medicamentos: Vec<Medicamento>,
    pub clinica: Clinica,
}

/// `GET /api/receitas`
pub async fn index(State(ctx): State<ApiContext>) -> Result<Json<ReceitasIndex>, ApiError> {
    let conn = ctx.core.open_db(Bind::Receitas)?;
    let modelos = db::list_modelos_receita(&conn)?;
    let medicamentos = db::list_medicamentos(&conn, Some(INDEX_MEDICAMENTOS))?;
    drop(conn);
    let clinica = ctx.core.clinica().await?;
    Ok(Json(ReceitasIndex {
        modelos,
        medicamentos,
        clinica,
    }))
}

// ═══════════════════════════════════════════════════════════
// Templates
// ═══════════════════════════════════════════════════════════

/// `GET /api/receitas/modelos`
pub async fn modelos(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<ModeloReceita>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Receitas)?;
    Ok(Json(db::list_modelos_receita(&conn)?))
}

/// `GET /api/receitas/modelos/:id`
pub async fn modelo(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<ModeloReceita>, ApiError> {
    let conn = ctx.core.open_db(Bind::Receitas)?;
    Ok(Json(db::get_modelo_receita(&conn, id)?.ok_or_else(modelo_not_found)?))
}

/// `POST /api/receitas/modelos`
pub async fn create_modelo(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Json(input): Json<ModeloInput>,
) -> Result<(StatusCode, Json<ModeloReceita>), ApiError> {
    let (titulo, conteudo) = owned(input.validate()?);
    let usuario_id = me.user.id;
    let modelo = ctx
        .core
        .write_blocking(Bind::Receitas, move |tx| {
            let id = db::insert_modelo_receita(tx, &titulo, &conteudo, Some(usuario_id))?;
            db::get_modelo_receita(tx, id)?.ok_or_else(modelo_not_found)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(modelo)))
}

/// `PUT /api/receitas/modelos/:id`
pub async fn update_modelo(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(input): Json<ModeloInput>,
) -> Result<Json<ModeloReceita>, ApiError> {
    let (titulo, conteudo) = owned(input.validate()?);
    let modelo = ctx
        .core
        .write_blocking(Bind::Receitas, move |tx| {
            db::get_modelo_receita(tx, id)?.ok_or_else(modelo_not_found)?;
            db::update_modelo_receita(tx, id, &titulo, &conteudo)?;
            db::get_modelo_receita(tx, id)?.ok_or_else(modelo_not_found)
        })
        .await?;
    Ok(Json(modelo))
}

/// `DELETE /api/receitas/modelos/:id`
pub async fn delete_modelo(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.core
        .write_blocking(Bind::Receitas, move |tx| {
            db::get_modelo_receita(tx, id)?.ok_or_else(modelo_not_found)?;
            Ok::<_, ApiError>(db::delete_modelo_receita(tx, id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ═══════════════════════════════════════════════════════════
// Medications
// ═══════════════════════════════════════════════════════════

/// `GET /api/receitas/medicamentos`
pub async fn medicamentos(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<Medicamento>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Receitas)?;
    Ok(Json(db::list_medicamentos(&conn, None)?))
}

/// `GET /api/receitas/medicamentos/:id`
pub async fn medicamento(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<Medicamento>, ApiError> {
    let conn = ctx.core.open_db(Bind::Receitas)?;
    Ok(Json(
        db::get_medicamento(&conn, id)?
            .ok_or_else(|| ApiError::NotFound("Medicamento não encontrado".into()))?,
    ))
}

#[derive(Deserialize)]
pub struct TermoQuery {
    #[serde(default)]
    pub termo: String,
}

/// `GET /api/receitas/medicamentos/buscar?termo=`: every text column.
pub async fn buscar(
    State(ctx): State<ApiContext>,
    Query(query): Query<TermoQuery>,
) -> Result<Json<Vec<Medicamento>>, ApiError> {
    let termo = query.termo.trim();
    if termo.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let conn = ctx.core.open_db(Bind::Receitas)?;
    Ok(Json(db::search_medicamentos_completo(&conn, termo)?))
}

#[derive(Deserialize)]
pub struct QQuery {
    #[serde(default)]
    pub q: String,
}

/// `GET /api/receitas/api/medicamentos?q=`
pub async fn buscar_rapido(
    State(ctx): State<ApiContext>,
    Query(query): Query<QQuery>,
) -> Result<Json<Vec<MedicamentoItem>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Receitas)?;
    let rows = db::search_medicamentos_rapido(&conn, &query.q, QUICK_SEARCH_LIMIT)?;
    Ok(Json(rows.into_iter().map(MedicamentoItem::from).collect()))
}

#[derive(Serialize)]
pub struct SeedResponse {
    pub inserted: usize,
}

/// `POST /api/receitas/medicamentos/seed`
pub async fn seed(State(ctx): State<ApiContext>) -> Result<Json<SeedResponse>, ApiError> {
    let inserted = ctx
        .core
        .write_blocking(Bind::Receitas, |tx| {
            Ok::<_, ApiError>(prescriptions::seed_medicamentos(tx)?)
        })
        .await?;
    Ok(Json(SeedResponse { inserted }))
}

/// `GET /api/receitas/api/dentista/:id`
pub async fn dentista(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<DentistaDados>, ApiError> {
    let conn = ctx.core.open_db(Bind::Users)?;
    let user = db::get_dentista(&conn, id)?
        .ok_or_else(|| ApiError::NotFound("Dentista não encontrado".into()))?;
    Ok(Json(DentistaDados::from(user)))
}

/// `POST /api/receitas/pdf`
pub async fn pdf(
    State(ctx): State<ApiContext>,
    Json(input): Json<ReceitaInput>,
) -> Result<Response, ApiError> {
    let paciente = {
        let conn = ctx.core.open_db(Bind::Pacientes)?;
        db::get_paciente(&conn, input.paciente_id)?
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| ApiError::not_found("Paciente"))?
    };
    let users = ctx.core.open_db(Bind::Users)?;
    let dentista = db::get_user(&users, input.dentista_id)?
        .filter(|u| u.cargo.is_professional())
        .ok_or_else(|| ApiError::NotFound("Dentista não encontrado".into()))?;
    drop(users);
    let clinica = ctx.core.clinica().await?;

    let (bytes, filename) =
        prescriptions::prescription_pdf(&paciente, &dentista, &clinica, &input.conteudo)?;
    tracing::info!(paciente_id = paciente.id, dentista_id = dentista.id, "Prescription issued");
    Ok(pdf_attachment(bytes, &filename))
}
