//! Treatment categories and the priced treatments inside them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::catalog::{CategoriaForm, TratamentoForm};
use crate::db::{self, Bind, DatabaseError};
use crate::models::{Cargo, CategoriaTratamento, Tratamento};

const GESTAO: &[Cargo] = &[Cargo::Admin, Cargo::Gerente];
const TRATAMENTO_EDIT: &[Cargo] = &[Cargo::Admin, Cargo::Gerente, Cargo::Dentista];

fn categoria_not_found() -> ApiError {
    ApiError::NotFound("Categoria não encontrada".into())
}

/// Category names are unique.
fn categoria_error(err: DatabaseError) -> ApiError {
    if err.is_unique_violation() {
        ApiError::Conflict("Categoria já existe".into())
    } else {
        err.into()
    }
}

/// `GET /api/catalogo/categorias`
pub async fn categorias(
    State(ctx): State<ApiContext>,
) -> Result<Json<Vec<CategoriaTratamento>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Tratamentos)?;
    Ok(Json(db::list_categorias(&conn)?))
}

#[derive(Serialize)]
pub struct CategoriaView {
    pub categoria: CategoriaTratamento,
    pub tratamentos: Vec<Tratamento>,
}

/// `GET /api/catalogo/categorias/:id`
pub async fn categoria(
    State(ctx): State<ApiContext>,
    Path(id): Path<i64>,
) -> Result<Json<CategoriaView>, ApiError> {
    let conn = ctx.core.open_db(Bind::Tratamentos)?;
    let categoria = db::get_categoria(&conn, id)?.ok_or_else(categoria_not_found)?;
    let tratamentos = db::list_tratamentos(&conn, id)?;
    Ok(Json(CategoriaView {
        categoria,
        tratamentos,
    }))
}

/// `POST /api/catalogo/categorias`
pub async fn create_categoria(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Json(form): Json<CategoriaForm>,
) -> Result<(StatusCode, Json<CategoriaTratamento>), ApiError> {
    me.require(GESTAO)?;
    let (nome, descricao) = form.validate()?;
    let (n, d) = (nome.clone(), descricao.clone());
    let id = ctx
        .core
        .write_blocking(Bind::Tratamentos, move |tx| {
            db::insert_categoria(tx, &n, d.as_deref()).map_err(categoria_error)
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CategoriaTratamento {
            id,
            nome,
            descricao,
        }),
    ))
}

/// `PUT /api/catalogo/categorias/:id`
pub async fn update_categoria(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<CategoriaForm>,
) -> Result<Json<CategoriaTratamento>, ApiError> {
    me.require(GESTAO)?;
    let (nome, descricao) = form.validate()?;
    let (n, d) = (nome.clone(), descricao.clone());
    ctx.core
        .write_blocking(Bind::Tratamentos, move |tx| {
            db::update_categoria(tx, id, &n, d.as_deref()).map_err(categoria_error)
        })
        .await?;
    Ok(Json(CategoriaTratamento {
        id,
        nome,
        descricao,
    }))
}

/// `DELETE /api/catalogo/categorias/:id`: refused while it holds treatments.
pub async fn delete_categoria(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    me.require_admin()?;
    ctx.core
        .write_blocking(Bind::Tratamentos, move |tx| {
            db::get_categoria(tx, id)?.ok_or_else(categoria_not_found)?;
            if db::count_tratamentos(tx, id)? > 0 {
                return Err(ApiError::Conflict(
                    "Categoria com tratamentos não pode ser removida".into(),
                ));
            }
            Ok(db::delete_categoria(tx, id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/catalogo/categorias/:id/tratamentos`
pub async fn create_tratamento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(categoria_id): Path<i64>,
    Json(form): Json<TratamentoForm>,
) -> Result<(StatusCode, Json<Tratamento>), ApiError> {
    me.require(TRATAMENTO_EDIT)?;
    let tratamento = form.into_tratamento(categoria_id)?;
    let tratamento = ctx
        .core
        .write_blocking(Bind::Tratamentos, move |tx| {
            db::get_categoria(tx, categoria_id)?.ok_or_else(categoria_not_found)?;
            let id = db::insert_tratamento(tx, &tratamento)?;
            db::get_tratamento(tx, id)?.ok_or_else(|| ApiError::not_found("Tratamento"))
        })
        .await?;
    Ok((StatusCode::CREATED, Json(tratamento)))
}

/// `PUT /api/catalogo/tratamentos/:id`
pub async fn update_tratamento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<TratamentoForm>,
) -> Result<Json<Tratamento>, ApiError> {
    me.require(TRATAMENTO_EDIT)?;
    let tratamento = ctx
        .core
        .write_blocking(Bind::Tratamentos, move |tx| {
            let mut tratamento =
                db::get_tratamento(tx, id)?.ok_or_else(|| ApiError::not_found("Tratamento"))?;
            form.clone().apply_to(&mut tratamento)?;
            db::update_tratamento(tx, &tratamento)?;
            Ok::<_, ApiError>(tratamento)
        })
        .await?;
    Ok(Json(tratamento))
}

/// `DELETE /api/catalogo/tratamentos/:id`
pub async fn delete_tratamento(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    me.require(GESTAO)?;
    ctx.core
        .write_blocking(Bind::Tratamentos, move |tx| {
            Ok::<_, ApiError>(db::delete_tratamento(tx, id)?)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
