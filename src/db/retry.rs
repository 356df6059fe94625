//! Retrying writes around SQLite lock contention.
//!
//! A unit of work runs inside an IMMEDIATE transaction. When SQLite
//! reports the database as busy or locked, the transaction is rolled
//! back and the whole unit is replayed after an exponential backoff.
//! Any other error surfaces on the first failure.

use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use super::DatabaseError;

const BUSY_MESSAGES: &[&str] = &[
    "database is locked",
    "database is busy",
    "sqlite_busy",
    "database table is locked",
];

/// Backoff schedule: `base_delay * multiplier^(retry - 1)` before each retry.
///
/// `max_retries` counts replays after the first try, so an operation
/// runs at most `max_retries + 1` times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Session-level commit: 5 retries starting at 100 ms.
    pub const fn commit() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            multiplier: 2,
        }
    }

    /// Explicit transactional blocks: 3 retries starting at 200 ms.
    pub const fn transactional() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2,
        }
    }

    /// Delay to wait before the given retry (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::commit()
    }
}

/// Errors that can tell whether they came from lock contention.
pub trait Retryable {
    fn is_busy(&self) -> bool;
}

impl Retryable for rusqlite::Error {
    fn is_busy(&self) -> bool {
        is_busy(self)
    }
}

impl Retryable for DatabaseError {
    fn is_busy(&self) -> bool {
        match self {
            DatabaseError::Sqlite(e) => is_busy(e),
            _ => false,
        }
    }
}

/// True for SQLITE_BUSY / SQLITE_LOCKED or their textual forms.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = err {
        if matches!(
            ffi_err.code,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ) {
            return true;
        }
    }
    let message = err.to_string().to_lowercase();
    BUSY_MESSAGES.iter().any(|m| message.contains(m))
}

/// Run `op` until it succeeds, fails with a non-busy error, or the
/// policy runs out of retries.
pub fn with_retry<T, E, F>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let max_retries = policy.max_retries;
    let mut retries = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_busy() && retries < max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                tracing::debug!(
                    label,
                    retry = retries,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Database busy, retrying"
                );
                std::thread::sleep(delay);
            }
            Err(err) => {
                if err.is_busy() {
                    tracing::error!(label, retries, "Database still busy: {err}");
                }
                return Err(err);
            }
        }
    }
}

/// Run `work` in an IMMEDIATE transaction, committing on success.
///
/// Errors roll the transaction back. Busy errors raised while
/// beginning, inside `work`, or at commit replay the whole unit.
pub fn transactional<T, E, F>(conn: &mut Connection, policy: &RetryPolicy, mut work: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display + From<rusqlite::Error>,
    F: FnMut(&Transaction<'_>) -> Result<T, E>,
{
    with_retry(policy, "transaction", || {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Dropping `tx` on the error path rolls back.
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    })
}
