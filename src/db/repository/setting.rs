use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let value: Option<Option<String>> = conn
        .query_row("SELECT value FROM app_settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value.flatten())
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn delete_setting(conn: &Connection, key: &str) -> Result<bool, DatabaseError> {
    Ok(conn.execute("DELETE FROM app_settings WHERE key = ?1", [key])? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    #[test]
    fn set_overwrite_delete() {
        let conn = open_memory_database(Bind::Calendario).unwrap();
        assert_eq!(get_setting(&conn, "invertexto_token").unwrap(), None);

        set_setting(&conn, "invertexto_token", "a").unwrap();
        set_setting(&conn, "invertexto_token", "b").unwrap();
        assert_eq!(get_setting(&conn, "invertexto_token").unwrap().as_deref(), Some("b"));

        assert!(delete_setting(&conn, "invertexto_token").unwrap());
        assert!(!delete_setting(&conn, "invertexto_token").unwrap());
    }
}
