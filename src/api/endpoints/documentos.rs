//! Clinical documents: free-form records and documents generated from the
//! configured types, with HTML and PDF output.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::error::ApiError;
use crate::api::types::{pdf_attachment, ApiContext, UserContext};
use crate::db::{self, Bind};
use crate::documents::{self, DocumentSummary, DocumentType, RenderedDocument};
use crate::models::Documento;

const INDEX_LIMIT: i64 = 10;
const HISTORY_LIMIT: i64 = 50;

fn documento_not_found() -> ApiError {
    ApiError::NotFound("Documento não encontrado".into())
}

fn load(ctx: &ApiContext, id: i64) -> Result<Documento, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    db::get_documento(&conn, id)?.ok_or_else(documento_not_found)
}

/// Resolve patient, signer and clinic, then render. Documents whose type
/// is no longer configured render with an empty body.
async fn render(ctx: &ApiContext, doc: &Documento) -> Result<RenderedDocument, ApiError> {
    let paciente = match doc.paciente_id {
        Some(id) => {
            let conn = ctx.core.open_db(Bind::Pacientes)?;
            db::get_paciente(&conn, id)?
        }
        None => None,
    };
    let dentista = match doc.dentista_id {
        Some(id) => {
            let conn = ctx.core.open_db(Bind::Users)?;
            db::get_user(&conn, id)?
        }
        None => None,
    };
    let clinica = ctx.core.clinica().await?;
    let fallback;
    let cfg = match ctx.core.document_types().get(&doc.tipo_documento) {
        Some(cfg) => cfg,
        None => {
            fallback = DocumentType {
                titulo: doc.titulo_documento.clone(),
                template: String::new(),
                campos: Vec::new(),
            };
            &fallback
        }
    };
    Ok(documents::render(
        doc,
        cfg,
        paciente.as_ref(),
        dentista.as_ref(),
        &clinica,
    ))
}

#[derive(Serialize)]
pub struct TipoItem {
    pub tipo: String,
    pub titulo: String,
}

#[derive(Serialize)]
pub struct DocumentosIndex {
    pub recentes: Vec<DocumentSummary>,
    pub tipos: Vec<TipoItem>,
    pub total: i64,
}

/// `GET /api/documentos`
pub async fn index(State(ctx): State<ApiContext>) -> Result<Json<DocumentosIndex>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let recentes = db::list_documentos_recentes(&conn, INDEX_LIMIT)?;
    let tipos = ctx
        .core
        .document_types()
        .tipos_documentos
        .iter()
        .map(|(tipo, cfg)| TipoItem {
            tipo: tipo.clone(),
            titulo: cfg.titulo.clone(),
        })
        .collect();
    Ok(Json(DocumentosIndex {
        recentes: recentes.iter().map(DocumentSummary::from).collect(),
        tipos,
        total: db::count_documentos(&conn)?,
    }))
}

/// `GET /api/documentos/historico`
pub async fn historico(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Pacientes)?;
    let docs = db::list_documentos_recentes(&conn, HISTORY_LIMIT)?;
    Ok(Json(docs.iter().map(DocumentSummary::from).collect()))
}

/// `GET /api/documentos/tipos/:tipo`: field definitions for the form.
pub async fn tipo(
    State(ctx): State<ApiContext>,
    Path(tipo): Path<String>,
) -> Result<Json<DocumentType>, ApiError> {
    let cfg = ctx
        .core
        .document_types()
        .get(&tipo)
        .cloned()
        .ok_or(documents::DocumentError::UnknownType)?;
    Ok(Json(cfg))
}

#[derive(Deserialize)]
pub struct SimpleBody {
    #[serde(default)]
    pub titulo: String,
    pub tipo: Option<String>,
    pub observacoes: Option<String>,
}

/// `POST /api/documentos`
pub async fn create(
    State(ctx): State<ApiContext>,
    Json(body): Json<SimpleBody>,
) -> Result<(StatusCode, Json<Documento>), ApiError> {
    let mut doc = documents::simple(&body.titulo, body.tipo.as_deref(), body.observacoes.as_deref())?;
    let row = doc.clone();
    let id = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            Ok::<_, ApiError>(db::insert_documento(tx, &row)?)
        })
        .await?;
    doc.id = id;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// `POST /api/documentos/gerar/:tipo`
pub async fn generate(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(tipo): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Documento>), ApiError> {
    let clinica = ctx.core.clinica().await?;
    let mut doc = documents::generate(&tipo, ctx.core.document_types(), &body, &clinica)?;
    let row = doc.clone();
    let id = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            Ok::<_, ApiError>(db::insert_documento(tx, &row)?)
        })
        .await?;
    doc.id = id;
    tracing::info!(documento_id = id, tipo = %tipo, by = %me.user.username, "Document generated");
    Ok((StatusCode::CREATED, Json(doc)))
}

#[derive(Deserialize)]
pub struct EditBody {
    #[serde(default)]
    pub titulo: String,
    pub observacoes: Option<String>,
}

/// `PUT /api/documentos/:id`: title and notes only.
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
    Json(body): Json<EditBody>,
) -> Result<Json<Documento>, ApiError> {
    let titulo = body.titulo.trim().to_string();
    if titulo.is_empty() {
        return Err(documents::DocumentError::MissingTitle.into());
    }
    let observacoes = body
        .observacoes
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string);
    let doc = ctx
        .core
        .write_blocking(Bind::Pacientes, move |tx| {
            db::update_documento_metadados(tx, id, &titulo, observacoes.as_deref())?;
            db::get_documento(tx, id)?.ok_or_else(documento_not_found)
        })
        .await?;
    Ok(Json(doc))
}

/// `DELETE /api/documentos/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.core
        .write_blocking(Bind::Pacientes, move |tx| {
            Ok::<_, ApiError>(db::delete_documento(tx, id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/documentos/api/:id`
pub async fn summary(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentSummary>, ApiError> {
    let doc = load(&ctx, id)?;
    Ok(Json(DocumentSummary::from(&doc)))
}

/// `GET /api/documentos/:id/html`
pub async fn html(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Html<String>, ApiError> {
    let doc = load(&ctx, id)?;
    Ok(Html(render(&ctx, &doc).await?.to_html()))
}

/// `GET /api/documentos/:id/pdf`
pub async fn pdf(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let doc = load(&ctx, id)?;
    let rendered = render(&ctx, &doc).await?;
    let bytes = rendered.to_pdf()?;
    Ok(pdf_attachment(bytes, &rendered.filename))
}
