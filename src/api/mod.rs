//! JSON API.
//!
//! Routes are nested under `/api/` and protected by a middleware stack:
//! Auth → Audit → Handler.
//!
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server instance; `server` runs it standalone.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{serve, start_server, ApiServer, ServerSession};
pub use types::ApiContext;
