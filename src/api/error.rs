//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::anesthetic::CalcError;
use crate::assistant::AssistantError;
use crate::auth::AuthError;
use crate::agenda::AgendaError;
use crate::catalog::CatalogError;
use crate::certificates::CertificateError;
use crate::core_state::CoreError;
use crate::cro::CroError;
use crate::db::{DatabaseError, Retryable};
use crate::documents::DocumentError;
use crate::holidays::HolidayError;
use crate::patients::{CpfError, PatientError};
use crate::pdf::PdfError;
use crate::prescriptions::PrescriptionError;
use crate::users::UserError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("Sessão expirada")]
    SessionExpired,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Gone(String),
    #[error("{0}")]
    Locked(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(DatabaseError),
}

impl ApiError {
    pub fn login_required() -> Self {
        ApiError::Unauthorized("Login necessário".into())
    }

    pub fn forbidden() -> Self {
        ApiError::Forbidden("Sem permissão".into())
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} não encontrado"))
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", m.clone()),
            ApiError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Sessão expirada".to_string(),
            ),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, "FORBIDDEN", m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m.clone()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", m.clone()),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, "CONFLICT", m.clone()),
            ApiError::Gone(m) => (StatusCode::GONE, "GONE", m.clone()),
            ApiError::Locked(m) => (StatusCode::LOCKED, "LOCKED", m.clone()),
            ApiError::ServiceUnavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", m.clone())
            }
            ApiError::BadGateway(m) => (StatusCode::BAD_GATEWAY, "UPSTREAM", m.clone()),
            ApiError::Database(DatabaseError::NotFound { entity_type, .. }) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{entity_type} não encontrado"),
            ),
            ApiError::Database(DatabaseError::ConstraintViolation(m)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", m.clone())
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                internal()
            }
            ApiError::Database(e) => {
                tracing::error!(error = %e, "API database error");
                internal()
            }
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL",
        "An internal error occurred".to_string(),
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl Retryable for ApiError {
    fn is_busy(&self) -> bool {
        matches!(self, ApiError::Database(e) if e.is_busy())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Database(err)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Database(DatabaseError::Sqlite(err))
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => ApiError::Database(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                ApiError::Unauthorized(err.to_string())
            }
            AuthError::SessionExpired => ApiError::SessionExpired,
            AuthError::Locked { .. } => ApiError::Locked(err.to_string()),
            AuthError::Inactive | AuthError::Forbidden => ApiError::Forbidden(err.to_string()),
            AuthError::WeakPassword(m) => ApiError::BadRequest(m),
            AuthError::Database(e) => ApiError::Database(e),
            AuthError::MalformedHash | AuthError::LockPoisoned => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::UsernameTaken | UserError::CroTaken | UserError::AlreadyBootstrapped => {
                ApiError::Conflict(err.to_string())
            }
            UserError::NotFound => ApiError::NotFound(err.to_string()),
            UserError::InvalidUsername | UserError::MissingPassword => {
                ApiError::BadRequest(err.to_string())
            }
            UserError::Auth(e) => e.into(),
            UserError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CpfError> for ApiError {
    fn from(err: CpfError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<PatientError> for ApiError {
    fn from(err: PatientError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<AgendaError> for ApiError {
    fn from(err: AgendaError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<HolidayError> for ApiError {
    fn from(err: HolidayError) -> Self {
        match err {
            HolidayError::Database(e) => ApiError::Database(e),
            e if e.is_client_error() => ApiError::BadRequest(e.to_string()),
            e => ApiError::BadGateway(e.to_string()),
        }
    }
}

impl From<CroError> for ApiError {
    fn from(err: CroError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<CalcError> for ApiError {
    fn from(err: CalcError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::Disabled => ApiError::ServiceUnavailable(err.to_string()),
            AssistantError::EmptyMessage => ApiError::BadRequest(err.to_string()),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<PdfError> for ApiError {
    fn from(err: PdfError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::UnknownType => ApiError::NotFound(err.to_string()),
            DocumentError::RequiredField(_) | DocumentError::MissingTitle => {
                ApiError::BadRequest(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<PrescriptionError> for ApiError {
    fn from(err: PrescriptionError) -> Self {
        match err {
            PrescriptionError::AlreadySeeded => ApiError::Conflict(err.to_string()),
            PrescriptionError::MissingTemplateFields | PrescriptionError::MissingContent => {
                ApiError::BadRequest(err.to_string())
            }
            PrescriptionError::Pdf(e) => e.into(),
            PrescriptionError::Database(e) => ApiError::Database(e),
        }
    }
}

impl From<CertificateError> for ApiError {
    fn from(err: CertificateError) -> Self {
        match err {
            CertificateError::MissingPatient => ApiError::BadRequest(err.to_string()),
            CertificateError::Pdf(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::login_required().into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
        assert_eq!(json["error"]["message"], "Login necessário");
    }

    #[tokio::test]
    async fn locked_account_returns_423() {
        let response = ApiError::from(AuthError::Locked { minutes: 3 }).into_response();
        assert_eq!(response.status(), StatusCode::LOCKED);
        let json = body_json(response).await;
        assert_eq!(
            json["error"]["message"],
            "Usuário bloqueado. Tente novamente em ~3 min."
        );
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn database_not_found_maps_to_404() {
        let response = ApiError::from(DatabaseError::not_found("Paciente", 4)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn domain_error_statuses() {
        let status = |e: ApiError| e.parts().0;
        assert_eq!(status(HolidayError::MissingToken.into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(HolidayError::RateLimited.into()), StatusCode::BAD_GATEWAY);
        assert_eq!(status(AssistantError::Disabled.into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(PrescriptionError::AlreadySeeded.into()), StatusCode::CONFLICT);
        assert_eq!(status(DocumentError::UnknownType.into()), StatusCode::NOT_FOUND);
        assert_eq!(status(UserError::CroTaken.into()), StatusCode::CONFLICT);
    }

    #[test]
    fn busy_database_errors_are_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(ApiError::from(busy).is_busy());
        assert!(!ApiError::BadRequest("x".into()).is_busy());
    }
}
