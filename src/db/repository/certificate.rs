use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

fn atestado_from_row(row: &Row<'_>) -> rusqlite::Result<Atestado> {
    Ok(Atestado {
        id: row.get(0)?,
        paciente: row.get(1)?,
        dias: row.get(2)?,
        data_emissao: row.get(3)?,
    })
}

pub fn insert_atestado(conn: &Connection, paciente: &str, dias: u32) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO atestados (paciente, dias, data_emissao) VALUES (?1, ?2, ?3)",
        params![paciente, dias, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_atestado(conn: &Connection, id: i64) -> Result<Option<Atestado>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, paciente, dias, data_emissao FROM atestados WHERE id = ?1",
            [id],
            atestado_from_row,
        )
        .optional()?)
}

/// Most recent certificates first.
pub fn list_atestados(conn: &Connection, limit: i64) -> Result<Vec<Atestado>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, paciente, dias, data_emissao FROM atestados
         ORDER BY data_emissao DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], atestado_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    #[test]
    fn latest_first_with_limit() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        for i in 0..3 {
            insert_atestado(&conn, &format!("Paciente {i}"), 2).unwrap();
        }
        let list = list_atestados(&conn, 2).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].paciente, "Paciente 2");
    }

    #[test]
    fn zero_days_rejected_by_schema() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        assert!(insert_atestado(&conn, "X", 0).is_err());
    }
}
