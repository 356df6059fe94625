//! Username/password login with failed-attempt lockout.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use subtle::ConstantTimeEq;

use super::password::{hash_password, verify_password};
use super::session::generate_token;
use super::AuthError;
use crate::config::Config;
use crate::db::{self, RetryPolicy};
use crate::models::{Cargo, User};

const DEV_USERNAME: &str = "dev";

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: User,
    /// Last password change is older than the configured maximum age.
    pub password_expired: bool,
    pub via_master_password: bool,
}

fn is_master(config: &Config, password: &str) -> bool {
    config
        .master_password
        .as_deref()
        .is_some_and(|m| bool::from(m.as_bytes().ct_eq(password.as_bytes())))
}

/// Minutes shown to a locked-out user.
pub fn lock_minutes_remaining(locked_until: NaiveDateTime, now: NaiveDateTime) -> i64 {
    (locked_until - now).num_seconds().max(0) / 60 + 1
}

/// Persist lockout counters as their own retried write, so a failed
/// attempt is recorded even though the login itself errors.
fn save_login_state(
    conn: &Connection,
    id: i64,
    failed: u32,
    locked_until: Option<NaiveDateTime>,
) -> Result<(), db::DatabaseError> {
    db::with_retry(&RetryPolicy::commit(), "login_state", || {
        db::set_login_state(conn, id, failed, locked_until)
    })
}

/// Check credentials and update the user's lockout counters.
///
/// The master password opens any account, including locked and inactive ones.
pub fn authenticate(
    conn: &Connection,
    config: &Config,
    username: &str,
    password: &str,
    now: NaiveDateTime,
) -> Result<LoginSuccess, AuthError> {
    let user = db::get_user_by_username(conn, username.trim())?
        .ok_or(AuthError::InvalidCredentials)?;
    let master = is_master(config, password);

    if let Some(until) = user.locked_until.filter(|u| *u > now) {
        if !master {
            return Err(AuthError::Locked {
                minutes: lock_minutes_remaining(until, now),
            });
        }
    }

    if !master && !verify_password(password, &user.password_hash) {
        let mut failed = user.failed_login_count + 1;
        let mut locked_until = user.locked_until;
        if failed >= config.max_failed_logins {
            locked_until = Some(now + Duration::minutes(config.lockout_minutes));
            failed = 0;
            tracing::warn!(username = %user.username, "Account locked after failed logins");
        }
        save_login_state(conn, user.id, failed, locked_until)?;
        return Err(AuthError::InvalidCredentials);
    }

    if !user.is_active && !master {
        return Err(AuthError::Inactive);
    }

    let password_expired = config.password_max_age_days > 0
        && user
            .last_password_change
            .is_some_and(|changed| now - changed > Duration::days(config.password_max_age_days));

    save_login_state(conn, user.id, 0, None)?;

    let mut user = user;
    user.failed_login_count = 0;
    user.locked_until = None;
    Ok(LoginSuccess {
        user,
        password_expired,
        via_master_password: master,
    })
}

/// User served when login is bypassed: the first admin, else the first
/// account, else a freshly seeded `dev` admin with an unusable password.
pub fn default_user(conn: &Connection, config: &Config) -> Result<User, AuthError> {
    if let Some(admin) = db::first_user_with_cargo(conn, Cargo::Admin)? {
        return Ok(admin);
    }
    if let Some(user) = db::first_user(conn)? {
        return Ok(user);
    }
    let ts = chrono::Local::now().naive_local();
    let mut user = User {
        id: 0,
        username: DEV_USERNAME.into(),
        nome_completo: Some("Dev Admin".into()),
        cro: None,
        nome_profissional: Some("Dev Admin".into()),
        password_hash: hash_password(&generate_token(), config.pbkdf2_iterations),
        cargo: Cargo::Admin,
        is_active: true,
        criado_em: ts,
        failed_login_count: 0,
        locked_until: None,
        last_password_change: Some(ts),
    };
    user.id = db::insert_user(conn, &user)?;
    tracing::warn!("Login bypass seeded the dev admin account");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use std::sync::mpsc;
    use std::thread;

    use crate::db::{open_database, open_memory_database, Bind};
    use crate::models::now;

    fn seed_ana(conn: &Connection, active: bool) {
        let user = User {
            id: 0,
            username: "ana".into(),
            nome_completo: Some("Ana Souza".into()),
            cro: None,
            nome_profissional: None,
            password_hash: hash_password("sorriso2024", 1_000),
            cargo: Cargo::Dentista,
            is_active: active,
            criado_em: now(),
            failed_login_count: 0,
            locked_until: None,
            last_password_change: Some(now()),
        };
        db::insert_user(conn, &user).unwrap();
    }

    fn setup(active: bool) -> (Connection, Config) {
        let conn = open_memory_database(Bind::Users).unwrap();
        seed_ana(&conn, active);
        let config = Config {
            master_password: Some("chave-mestra".into()),
            ..Config::default()
        };
        (conn, config)
    }

    #[test]
    fn correct_password_logs_in() {
        let (conn, config) = setup(true);
        let ok = authenticate(&conn, &config, "ana", "sorriso2024", now()).unwrap();
        assert_eq!(ok.user.username, "ana");
        assert!(!ok.password_expired);
        assert!(!ok.via_master_password);
    }

    #[test]
    fn unknown_user_is_invalid_credentials() {
        let (conn, config) = setup(true);
        assert!(matches!(
            authenticate(&conn, &config, "bob", "x", now()),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn fifth_failure_locks_and_resets_counter() {
        let (conn, config) = setup(true);
        let t = now();
        for _ in 0..4 {
            assert!(authenticate(&conn, &config, "ana", "errada", t).is_err());
        }
        let before = db::get_user_by_username(&conn, "ana").unwrap().unwrap();
        assert_eq!(before.failed_login_count, 4);

        assert!(authenticate(&conn, &config, "ana", "errada", t).is_err());
        let locked = db::get_user_by_username(&conn, "ana").unwrap().unwrap();
        assert_eq!(locked.failed_login_count, 0);
        assert!(locked.locked_until.is_some());

        match authenticate(&conn, &config, "ana", "sorriso2024", t) {
            Err(AuthError::Locked { minutes }) => assert_eq!(minutes, 16),
            other => panic!("expected lock, got {other:?}"),
        }
    }

    #[test]
    fn failed_attempt_is_recorded_while_another_writer_holds_the_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("users.db");
        let conn = open_database(&path, Bind::Users).unwrap();
        seed_ana(&conn, true);
        // Fail fast on the lock so the retry schedule does the waiting
        conn.busy_timeout(std::time::Duration::ZERO).unwrap();
        let config = Config::default();

        let (locked_tx, locked_rx) = mpsc::channel();
        let holder_path = path.clone();
        let holder = thread::spawn(move || {
            let holder = Connection::open(&holder_path).unwrap();
            holder.execute_batch("BEGIN IMMEDIATE").unwrap();
            locked_tx.send(()).unwrap();
            thread::sleep(std::time::Duration::from_millis(250));
            holder.execute_batch("COMMIT").unwrap();
        });
        locked_rx.recv().unwrap();

        let result = authenticate(&conn, &config, "ana", "errada", now());
        holder.join().unwrap();

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        let stored = db::get_user_by_username(&conn, "ana").unwrap().unwrap();
        assert_eq!(stored.failed_login_count, 1);
    }

    #[test]
    fn master_password_bypasses_lock_and_inactive() {
        let (conn, config) = setup(false);
        let t = now();
        let id = db::get_user_by_username(&conn, "ana").unwrap().unwrap().id;
        db::set_login_state(&conn, id, 0, Some(t + Duration::minutes(10))).unwrap();

        let ok = authenticate(&conn, &config, "ana", "chave-mestra", t).unwrap();
        assert!(ok.via_master_password);
        let stored = db::get_user(&conn, id).unwrap().unwrap();
        assert!(stored.locked_until.is_none());
    }

    #[test]
    fn inactive_user_rejected() {
        let (conn, config) = setup(false);
        assert!(matches!(
            authenticate(&conn, &config, "ana", "sorriso2024", now()),
            Err(AuthError::Inactive)
        ));
    }

    #[test]
    fn old_password_reported_expired() {
        let (conn, config) = setup(true);
        let later = now() + Duration::days(181);
        let ok = authenticate(&conn, &config, "ana", "sorriso2024", later).unwrap();
        assert!(ok.password_expired);
    }

    #[test]
    fn remaining_minutes_round_up() {
        let t = now();
        assert_eq!(lock_minutes_remaining(t + Duration::seconds(30), t), 1);
        assert_eq!(lock_minutes_remaining(t + Duration::minutes(15), t), 16);
    }

    #[test]
    fn default_user_prefers_admin_then_seeds_dev() {
        let (conn, config) = setup(true);
        // Only a dentist exists
        assert_eq!(default_user(&conn, &config).unwrap().username, "ana");

        let empty = open_memory_database(Bind::Users).unwrap();
        let dev = default_user(&empty, &config).unwrap();
        assert_eq!(dev.username, "dev");
        assert_eq!(dev.cargo, Cargo::Admin);
        // Second call reuses the seeded account
        assert_eq!(default_user(&empty, &config).unwrap().id, dev.id);
        assert_eq!(db::count_users(&empty).unwrap(), 1);
    }

}
