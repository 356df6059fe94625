//! Shared application state.
//!
//! `CoreState` is created once at startup, wrapped in `Arc` and handed to
//! the HTTP router. It owns the configuration, the database binds and the
//! in-memory caches (sessions, holiday lookups, document types).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use rusqlite::{Connection, Transaction};

use crate::assistant::Assistant;
use crate::auth::SessionStore;
use crate::config::Config;
use crate::db::{self, Bind, Binds, RetryPolicy, Retryable};
use crate::documents::{DocumentError, DocumentTypes};
use crate::holidays::HolidayCache;
use crate::models::Clinica;

/// Maximum audit entries kept in memory; older ones are dropped.
const AUDIT_BUFFER_CAPACITY: usize = 500;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: Config,
    binds: Binds,
    sessions: Mutex<SessionStore>,
    holidays: Mutex<HolidayCache>,
    document_types: DocumentTypes,
    assistant: Arc<Assistant>,
    audit: AuditLogger,
}

impl CoreState {
    /// Prepare every bind and load the instance configuration files.
    pub fn new(config: Config) -> Result<Self, CoreError> {
        let binds = Binds::new(config.instance_dir.clone());
        binds.initialize_all()?;
        let document_types = DocumentTypes::load(&config.instance_dir)?;
        let assistant = Arc::new(Assistant::from_config(&config.ai));
        Ok(Self {
            sessions: Mutex::new(SessionStore::with_timeout_minutes(config.session_timeout_min)),
            holidays: Mutex::new(HolidayCache::default()),
            binds,
            document_types,
            assistant,
            audit: AuditLogger::new(),
            config,
        })
    }

    // ── Database access ─────────────────────────────────────

    pub fn binds(&self) -> &Binds {
        &self.binds
    }

    /// Open a connection to one bind.
    pub fn open_db(&self, bind: Bind) -> Result<Connection, CoreError> {
        Ok(self.binds.open(bind)?)
    }

    /// Run `work` as one retried write transaction on `bind`.
    pub fn write<T, E, F>(&self, bind: Bind, work: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display + From<rusqlite::Error> + From<db::DatabaseError>,
        F: FnMut(&Transaction<'_>) -> Result<T, E>,
    {
        let mut conn = self.binds.open(bind)?;
        db::transactional(&mut conn, &RetryPolicy::commit(), work)
    }

    /// `write` on the blocking pool, so lock waits and backoff sleeps
    /// never park a runtime worker.
    pub async fn write_blocking<T, E, F>(self: &Arc<Self>, bind: Bind, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: Retryable
            + std::fmt::Display
            + From<rusqlite::Error>
            + From<db::DatabaseError>
            + From<CoreError>
            + Send
            + 'static,
        F: FnMut(&Transaction<'_>) -> Result<T, E> + Send + 'static,
    {
        let core = Arc::clone(self);
        tokio::task::spawn_blocking(move || core.write(bind, work))
            .await
            .map_err(|e| E::from(CoreError::Task(e.to_string())))?
    }

    /// Clinic singleton, created with defaults on first use.
    pub async fn clinica(self: &Arc<Self>) -> Result<Clinica, CoreError> {
        self.write_blocking(Bind::Users, |tx| Ok(db::get_or_create_clinica(tx)?))
            .await
    }

    /// Modification time of a bind file, whole seconds since the epoch.
    pub fn bind_mtime(&self, bind: Bind) -> Option<u64> {
        std::fs::metadata(self.binds.path(bind))
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
    }

    // ── Caches ──────────────────────────────────────────────

    pub fn sessions(&self) -> Result<MutexGuard<'_, SessionStore>, CoreError> {
        self.sessions.lock().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn holidays(&self) -> Result<MutexGuard<'_, HolidayCache>, CoreError> {
        self.holidays.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// Drop every cached holiday lookup.
    pub fn clear_holiday_cache(&self) -> Result<(), CoreError> {
        self.holidays()?.clear();
        Ok(())
    }

    pub fn document_types(&self) -> &DocumentTypes {
        &self.document_types
    }

    pub fn assistant(&self) -> Arc<Assistant> {
        Arc::clone(&self.assistant)
    }

    // ── Audit ───────────────────────────────────────────────

    pub fn log_access(&self, user: Option<&str>, action: &str, status: u16) {
        self.audit.log(user, action, status);
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }
}

// ═══════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Document types: {0}")]
    DocumentTypes(#[from] DocumentError),
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.into())
    }
}

impl Retryable for CoreError {
    fn is_busy(&self) -> bool {
        matches!(self, Self::Database(e) if e.is_busy())
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

/// One handled request.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::NaiveDateTime,
    pub user: Option<String>,
    pub action: String,
    pub status: u16,
}

/// Bounded in-memory trail of recent requests, mirrored to `tracing`.
pub struct AuditLogger {
    buffer: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    pub fn log(&self, user: Option<&str>, action: &str, status: u16) {
        tracing::info!(user = user.unwrap_or("-"), action, status, "request");
        if let Ok(mut buf) = self.buffer.lock() {
            while buf.len() >= AUDIT_BUFFER_CAPACITY {
                buf.pop_front();
            }
            buf.push_back(AuditEntry {
                timestamp: crate::models::now(),
                user: user.map(str::to_string),
                action: action.to_string(),
                status,
            });
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// State over a fresh instance directory; keep the `TempDir` alive.
    pub(crate) fn test_state(configure: impl FnOnce(&mut Config)) -> (tempfile::TempDir, Arc<CoreState>) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config {
            instance_dir: tmp.path().join("instance"),
            pbkdf2_iterations: 1_000,
            ..Config::default()
        };
        config.ai.providers = vec!["simple".into()];
        configure(&mut config);
        let state = Arc::new(CoreState::new(config).unwrap());
        (tmp, state)
    }

    #[test]
    fn new_state_creates_every_bind() {
        let (_tmp, state) = test_state(|_| {});
        for bind in Bind::ALL {
            assert!(state.binds().path(bind).exists());
            assert!(state.bind_mtime(bind).is_some());
        }
        assert!(state.document_types().get("encaminhamento").is_some());
        assert!(state.sessions().unwrap().is_empty());
    }

    #[test]
    fn write_commits_through_retry_policy() {
        let (_tmp, state) = test_state(|_| {});
        let id: i64 = state
            .write(Bind::Pacientes, |tx| -> Result<i64, db::DatabaseError> {
                Ok(db::insert_atestado(tx, "Ana", 2)?)
            })
            .unwrap();
        let conn = state.open_db(Bind::Pacientes).unwrap();
        assert_eq!(db::get_atestado(&conn, id).unwrap().unwrap().dias, 2);
    }

    #[test]
    fn failed_write_rolls_back() {
        let (_tmp, state) = test_state(|_| {});
        let result: Result<(), db::DatabaseError> = state.write(Bind::Pacientes, |tx| {
            db::insert_atestado(tx, "Ana", 2)?;
            Err(db::DatabaseError::ConstraintViolation("abort".into()))
        });
        assert!(result.is_err());
        let conn = state.open_db(Bind::Pacientes).unwrap();
        assert!(db::list_atestados(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn audit_logger_is_bounded() {
        let logger = AuditLogger::new();
        for i in 0..(AUDIT_BUFFER_CAPACITY + 5) {
            logger.log(Some("ana"), &format!("GET /{i}"), 200);
        }
        assert_eq!(logger.buffer_len(), AUDIT_BUFFER_CAPACITY);
        let entries = logger.entries();
        assert_eq!(entries[0].action, "GET /5");
        assert_eq!(
            entries.last().map(|e| e.action.as_str()),
            Some(format!("GET /{}", AUDIT_BUFFER_CAPACITY + 4).as_str())
        );
    }

    #[tokio::test]
    async fn blocking_write_runs_off_the_runtime() {
        let (_tmp, state) = test_state(|_| {});
        let id = state
            .write_blocking(Bind::Pacientes, |tx| -> Result<i64, CoreError> {
                Ok(db::insert_atestado(tx, "Bruno", 3)?)
            })
            .await
            .unwrap();
        let conn = state.open_db(Bind::Pacientes).unwrap();
        assert_eq!(db::get_atestado(&conn, id).unwrap().unwrap().dias, 3);

        let first = state.clinica().await.unwrap();
        assert_eq!(state.clinica().await.unwrap(), first);
    }
}
