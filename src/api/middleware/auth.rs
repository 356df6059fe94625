//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, validates it against the
//! in-memory session store and injects `UserContext` into request
//! extensions for downstream handlers. Without a token, the login bypass
//! (when configured) serves the default user instead.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{bearer_token, ApiContext, UserContext};
use crate::auth;
use crate::db::{self, Bind};

/// Require a logged-in, active user.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(req.headers()).map(str::to_string);
    let user_ctx = match token {
        Some(token) => {
            // Guard dropped before any .await
            let user_id = ctx.core.sessions()?.validate(&token)?;
            let conn = ctx.core.open_db(Bind::Users)?;
            let user = db::get_user(&conn, user_id)?
                .filter(|u| u.is_active)
                .ok_or_else(|| {
                    if let Ok(mut sessions) = ctx.core.sessions() {
                        sessions.revoke(&token);
                    }
                    ApiError::login_required()
                })?;
            UserContext {
                user,
                token: Some(token),
            }
        }
        None if ctx.core.config.login_bypassed() => {
            let core = ctx.core.clone();
            let user = ctx
                .core
                .write_blocking(Bind::Users, move |tx| {
                    Ok::<_, ApiError>(auth::default_user(tx, &core.config)?)
                })
                .await?;
            UserContext { user, token: None }
        }
        None => return Err(ApiError::login_required()),
    };

    req.extensions_mut().insert(user_ctx);

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .entry("Cache-Control")
        .or_insert(HeaderValue::from_static("no-store"));
    Ok(response)
}
