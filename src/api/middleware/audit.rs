//! Audit logging middleware.
//!
//! Logs every API request with method, path, user and response status.
//! Runs innermost (after auth has injected `UserContext`).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::{ApiContext, UserContext};

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let ctx = req.extensions().get::<ApiContext>().cloned();
    let username = req
        .extensions()
        .get::<UserContext>()
        .map(|u| u.user.username.clone());

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        ctx.core.log_access(
            username.as_deref(),
            &format!("{method} {path}"),
            response.status().as_u16(),
        );
    }

    response
}
