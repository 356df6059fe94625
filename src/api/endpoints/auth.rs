//! Login, logout, login picker and first-run bootstrap.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::auth;
use crate::db::{self, Bind};
use crate::models::{now, User};
use crate::users::{self, LoginChoice, UserForm};

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub password_expired: bool,
}

/// `POST /api/auth/login`
///
/// Runs outside a transaction: failed attempts must persist their
/// lockout counters even though the call returns an error.
pub async fn login(
    State(ctx): State<ApiContext>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let core = ctx.core.clone();
    let success = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = core.open_db(Bind::Users)?;
        Ok(auth::authenticate(
            &conn,
            &core.config,
            &body.username,
            &body.password,
            now(),
        )?)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let token = ctx.core.sessions()?.issue(success.user.id);
    if success.via_master_password {
        tracing::warn!(username = %success.user.username, "Login with master password");
    } else {
        tracing::info!(username = %success.user.username, "Login");
    }

    Ok(Json(LoginResponse {
        token,
        user: success.user,
        password_expired: success.password_expired,
    }))
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<StatusCode, ApiError> {
    if let Some(token) = user.token.as_deref() {
        ctx.core.sessions()?.revoke(token);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/auth/users`: accounts offered on the login screen.
pub async fn users(State(ctx): State<ApiContext>) -> Result<Json<Vec<LoginChoice>>, ApiError> {
    let conn = ctx.core.open_db(Bind::Users)?;
    let users = db::list_users_for_login(&conn)?;
    Ok(Json(users.iter().map(LoginChoice::from).collect()))
}

/// `POST /api/auth/bootstrap`: first administrator of a fresh install.
pub async fn bootstrap(
    State(ctx): State<ApiContext>,
    Json(form): Json<UserForm>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let core = ctx.core.clone();
    let user = ctx
        .core
        .write_blocking(Bind::Users, move |tx| {
            Ok::<_, ApiError>(users::bootstrap_admin(tx, &core.config, &form)?)
        })
        .await?;
    tracing::info!(username = %user.username, "Administrator bootstrapped");
    Ok((StatusCode::CREATED, Json(user)))
}
