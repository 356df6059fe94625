//! Staff administration (admin only) and the caller's own profile.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::db::{self, Bind};
use crate::models::User;
use crate::users::{self, ProfileForm, UserForm};

/// `GET /api/users`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
) -> Result<Json<Vec<User>>, ApiError> {
    me.require_admin()?;
    let conn = ctx.core.open_db(Bind::Users)?;
    Ok(Json(db::list_users(&conn)?))
}

/// `POST /api/users`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Json(form): Json<UserForm>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    me.require_admin()?;
    let core = ctx.core.clone();
    let user = ctx
        .core
        .write_blocking(Bind::Users, move |tx| {
            Ok::<_, ApiError>(users::create_user(tx, &core.config, &form)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /api/users/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(form): Json<UserForm>,
) -> Result<Json<User>, ApiError> {
    me.require_admin()?;
    let core = ctx.core.clone();
    let user = ctx
        .core
        .write_blocking(Bind::Users, move |tx| {
            Ok::<_, ApiError>(users::update_user(tx, &core.config, id, &form)?)
        })
        .await?;
    Ok(Json(user))
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub id: i64,
    pub is_active: bool,
}

/// `POST /api/users/:id/toggle`
pub async fn toggle(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<ToggleResponse>, ApiError> {
    me.require_admin()?;
    if id == me.user.id {
        return Err(ApiError::BadRequest(
            "Não é possível desativar o próprio usuário".into(),
        ));
    }
    let is_active = ctx
        .core
        .write_blocking(Bind::Users, move |tx| {
            Ok::<_, ApiError>(users::toggle_active(tx, id)?)
        })
        .await?;
    if !is_active {
        ctx.core.sessions()?.revoke_user(id);
    }
    Ok(Json(ToggleResponse { id, is_active }))
}

/// `DELETE /api/users/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    me.require_admin()?;
    if id == me.user.id {
        return Err(ApiError::BadRequest(
            "Não é possível remover o próprio usuário".into(),
        ));
    }
    ctx.core
        .write_blocking(Bind::Users, move |tx| {
            Ok::<_, ApiError>(db::delete_user(tx, id)?)
        })
        .await?;
    ctx.core.sessions()?.revoke_user(id);
    tracing::info!(user_id = id, by = %me.user.username, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/users/me`
pub async fn me(Extension(me): Extension<UserContext>) -> Json<User> {
    Json(me.user)
}

/// `PUT /api/users/me`
pub async fn update_me(
    State(ctx): State<ApiContext>,
    Extension(me): Extension<UserContext>,
    Json(form): Json<ProfileForm>,
) -> Result<Json<User>, ApiError> {
    let core = ctx.core.clone();
    let id = me.user.id;
    let user = ctx
        .core
        .write_blocking(Bind::Users, move |tx| {
            Ok::<_, ApiError>(users::update_profile(tx, &core.config, id, &form)?)
        })
        .await?;
    Ok(Json(user))
}
