//! Staff authentication: password storage, login lockout and bearer sessions.

pub mod login;
pub mod password;
pub mod session;

pub use login::{authenticate, default_user, LoginSuccess};
pub use password::{hash_password, verify_password, PasswordPolicy};
pub use session::{generate_token, hash_token, SessionStore};

use crate::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Usuário bloqueado. Tente novamente em ~{minutes} min.")]
    Locked { minutes: i64 },

    #[error("Usuário inativo")]
    Inactive,

    #[error("Login necessário")]
    Unauthenticated,

    #[error("Sessão expirada")]
    SessionExpired,

    #[error("Sem permissão")]
    Forbidden,

    #[error("{0}")]
    WeakPassword(String),

    #[error("Malformed password hash")]
    MalformedHash,

    #[error("Session lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
