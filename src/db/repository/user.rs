use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

const USER_COLUMNS: &str = "id, username, nome_completo, cro, nome_profissional, password_hash,
     cargo, is_active, criado_em, failed_login_count, locked_until, last_password_change";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        nome_completo: row.get(2)?,
        cro: row.get(3)?,
        nome_profissional: row.get(4)?,
        password_hash: row.get(5)?,
        cargo: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
        criado_em: row.get(8)?,
        failed_login_count: row.get(9)?,
        locked_until: row.get(10)?,
        last_password_change: row.get(11)?,
    })
}

fn query_users(
    conn: &Connection,
    tail_sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users {tail_sql}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_user(
    conn: &Connection,
    tail_sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users {tail_sql}");
    Ok(conn.query_row(&sql, params, user_from_row).optional()?)
}

/// Insert a user; `user.id` is ignored.
pub fn insert_user(conn: &Connection, user: &User) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO users (username, nome_completo, cro, nome_profissional, password_hash,
         cargo, is_active, criado_em, failed_login_count, locked_until, last_password_change)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            user.username,
            user.nome_completo,
            user.cro,
            user.nome_profissional,
            user.password_hash,
            user.cargo,
            user.is_active as i32,
            user.criado_em,
            user.failed_login_count,
            user.locked_until,
            user.last_password_change,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update profile fields (not password or lockout state).
pub fn update_user_profile(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET username = ?2, nome_completo = ?3, cro = ?4, nome_profissional = ?5,
         cargo = ?6, is_active = ?7
         WHERE id = ?1",
        params![
            user.id,
            user.username,
            user.nome_completo,
            user.cro,
            user.nome_profissional,
            user.cargo,
            user.is_active as i32,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", user.id));
    }
    Ok(())
}

pub fn set_user_password(
    conn: &Connection,
    id: i64,
    password_hash: &str,
    changed_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2, last_password_change = ?3 WHERE id = ?1",
        params![id, password_hash, changed_at],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

/// Persist failed-login counter and lock deadline.
pub fn set_login_state(
    conn: &Connection,
    id: i64,
    failed_login_count: u32,
    locked_until: Option<NaiveDateTime>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE users SET failed_login_count = ?2, locked_until = ?3 WHERE id = ?1",
        params![id, failed_login_count, locked_until],
    )?;
    Ok(())
}

pub fn set_user_active(conn: &Connection, id: i64, active: bool) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET is_active = ?2 WHERE id = ?1",
        params![id, active as i32],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("User", id));
    }
    Ok(())
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>, DatabaseError> {
    query_user(conn, "WHERE id = ?1", [id])
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DatabaseError> {
    query_user(conn, "WHERE username = ?1", [username])
}

/// Id of another user already holding `username`.
pub fn find_username_owner(
    conn: &Connection,
    username: &str,
    exclude_id: Option<i64>,
) -> Result<Option<i64>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1 AND (?2 IS NULL OR id != ?2)",
            params![username, exclude_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Id of another user already holding `cro`.
pub fn find_cro_owner(
    conn: &Connection,
    cro: &str,
    exclude_id: Option<i64>,
) -> Result<Option<i64>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id FROM users WHERE cro = ?1 AND (?2 IS NULL OR id != ?2)",
            params![cro, exclude_id],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, DatabaseError> {
    query_users(conn, "ORDER BY username", [])
}

/// Login picker order: professional name, full name, username (NULLs last).
pub fn list_users_for_login(conn: &Connection) -> Result<Vec<User>, DatabaseError> {
    query_users(
        conn,
        "ORDER BY nome_profissional IS NULL, nome_profissional COLLATE NOCASE,
                  nome_completo IS NULL, nome_completo COLLATE NOCASE,
                  username",
        [],
    )
}

/// Active dentists and admins, as shown on the agenda.
pub fn list_professionals(conn: &Connection) -> Result<Vec<User>, DatabaseError> {
    query_users(
        conn,
        "WHERE is_active = 1 AND cargo IN ('dentista', 'admin')
         ORDER BY COALESCE(NULLIF(nome_profissional, ''), nome_completo, username) COLLATE NOCASE",
        [],
    )
}

pub fn professional_ids(conn: &Connection) -> Result<Vec<i64>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM users WHERE is_active = 1 AND cargo IN ('dentista', 'admin')",
    )?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// A user with cargo `dentista`.
pub fn get_dentista(conn: &Connection, id: i64) -> Result<Option<User>, DatabaseError> {
    query_user(conn, "WHERE id = ?1 AND cargo = 'dentista'", [id])
}

pub fn first_user_with_cargo(conn: &Connection, cargo: Cargo) -> Result<Option<User>, DatabaseError> {
    query_user(conn, "WHERE cargo = ?1 ORDER BY id LIMIT 1", [cargo])
}

pub fn first_user(conn: &Connection) -> Result<Option<User>, DatabaseError> {
    query_user(conn, "ORDER BY id LIMIT 1", [])
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    pub(crate) fn user(username: &str, cargo: Cargo) -> User {
        User {
            id: 0,
            username: username.into(),
            nome_completo: None,
            cro: None,
            nome_profissional: None,
            password_hash: "hash".into(),
            cargo,
            is_active: true,
            criado_em: now(),
            failed_login_count: 0,
            locked_until: None,
            last_password_change: None,
        }
    }

    #[test]
    fn professionals_are_active_dentists_and_admins() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let admin = insert_user(&conn, &user("admin", Cargo::Admin)).unwrap();
        let dent = insert_user(&conn, &user("dentista", Cargo::Dentista)).unwrap();
        insert_user(&conn, &user("recepcao", Cargo::Atendimento)).unwrap();
        let mut inactive = user("antigo", Cargo::Dentista);
        inactive.is_active = false;
        insert_user(&conn, &inactive).unwrap();

        let mut ids = professional_ids(&conn).unwrap();
        ids.sort();
        assert_eq!(ids, vec![admin, dent]);
        assert_eq!(list_professionals(&conn).unwrap().len(), 2);

        assert!(get_dentista(&conn, dent).unwrap().is_some());
        assert!(get_dentista(&conn, admin).unwrap().is_none());
    }

    #[test]
    fn login_order_puts_nulls_last() {
        let conn = open_memory_database(Bind::Users).unwrap();
        insert_user(&conn, &user("zz", Cargo::Atendimento)).unwrap();
        let mut named = user("aa", Cargo::Dentista);
        named.nome_profissional = Some("Dra. Beatriz".into());
        insert_user(&conn, &named).unwrap();

        let users = list_users_for_login(&conn).unwrap();
        assert_eq!(users[0].username, "aa");
        assert_eq!(users[1].username, "zz");
    }

    #[test]
    fn conflict_lookups_exclude_self() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let mut u = user("ana", Cargo::Dentista);
        u.cro = Some("12345".into());
        let id = insert_user(&conn, &u).unwrap();

        assert_eq!(find_username_owner(&conn, "ana", None).unwrap(), Some(id));
        assert_eq!(find_username_owner(&conn, "ana", Some(id)).unwrap(), None);
        assert_eq!(find_cro_owner(&conn, "12345", None).unwrap(), Some(id));
    }

    #[test]
    fn login_state_persists() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let id = insert_user(&conn, &user("bob", Cargo::Financeiro)).unwrap();
        let until = now();
        set_login_state(&conn, id, 3, Some(until)).unwrap();
        let stored = get_user(&conn, id).unwrap().unwrap();
        assert_eq!(stored.failed_login_count, 3);
        assert!(stored.locked_until.is_some());
    }

    #[test]
    fn short_username_rejected_by_schema() {
        let conn = open_memory_database(Bind::Users).unwrap();
        assert!(insert_user(&conn, &user("ab", Cargo::Admin)).is_err());
    }
}
