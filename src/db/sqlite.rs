use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::binds::Bind;
use super::DatabaseError;

/// Busy handler wait applied to every connection.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Open a SQLite connection for a bind, tune it and run its migrations.
pub fn open_database(path: &Path, bind: Bind) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn, bind)?;
    Ok(conn)
}

/// Open an in-memory database with a bind's schema (for testing)
pub fn open_memory_database(bind: Bind) -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn, bind)?;
    Ok(conn)
}

/// WAL journaling, enforced foreign keys, a short busy wait and
/// NORMAL sync. WAL is best effort: some filesystems refuse it.
pub fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    match conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0)) {
        Ok(mode) => tracing::trace!(mode, "journal mode set"),
        Err(e) => tracing::warn!("Could not enable WAL journaling: {e}"),
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;
         PRAGMA synchronous=NORMAL;",
    )?;
    Ok(())
}

/// Run all pending migrations for a bind
pub fn run_migrations(conn: &Connection, bind: Bind) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    for (version, sql) in bind.migrations() {
        if *version > current_version {
            tracing::info!(bind = bind.as_str(), "Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    bind: bind.as_str(),
                    version: *version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
pub fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, Option<i64>>(0),
    )
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn each_bind_gets_its_own_tables() {
        let pacientes = open_memory_database(Bind::Pacientes).unwrap();
        assert!(table_exists(&pacientes, "pacientes"));
        assert!(table_exists(&pacientes, "financeiro"));
        assert!(!table_exists(&pacientes, "users"));

        let users = open_memory_database(Bind::Users).unwrap();
        assert!(table_exists(&users, "users"));
        assert!(table_exists(&users, "clinica"));

        let agenda = open_memory_database(Bind::Calendario).unwrap();
        assert!(table_exists(&agenda, "calendar_event"));
        assert!(table_exists(&agenda, "holidays"));
        assert!(table_exists(&agenda, "app_settings"));

        let catalogo = open_memory_database(Bind::Tratamentos).unwrap();
        assert!(table_exists(&catalogo, "categoria_tratamento"));

        let receitas = open_memory_database(Bind::Receitas).unwrap();
        assert!(table_exists(&receitas, "medicamentos"));
        assert!(table_exists(&receitas, "modelos_receita"));
    }

    #[test]
    fn pacientes_bind_table_count() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        // 9 entity tables + schema_version
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 10);
    }

    #[test]
    fn schema_version_is_current() {
        for bind in Bind::ALL {
            let conn = open_memory_database(bind).unwrap();
            let latest = bind.migrations().last().map(|(v, _)| *v).unwrap();
            assert_eq!(get_current_version(&conn), latest, "{}", bind.as_str());
        }
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        assert!(run_migrations(&conn, Bind::Pacientes).is_ok());
    }

    #[test]
    fn pragmas_applied_to_file_database() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_database(&tmp.path().join("nested/pacientes.db"), Bind::Pacientes).unwrap();

        let fk: i64 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0)).unwrap();
        assert_eq!(fk, 1);

        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |r| r.get(0)).unwrap();
        assert_eq!(timeout, 1000);

        // NORMAL == 1
        let sync: i64 = conn.query_row("PRAGMA synchronous", [], |r| r.get(0)).unwrap();
        assert_eq!(sync, 1);
    }
}
