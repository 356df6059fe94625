use rusqlite::{params, Connection};

use super::{Page, Paginated};
use crate::db::DatabaseError;
use crate::models::*;

/// Insert a history entry; `entry.id` is ignored.
pub fn insert_historico(conn: &Connection, entry: &Historico) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO historicos (paciente_id, data, descricao, procedimentos_realizados, observacoes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.paciente_id,
            entry.data,
            entry.descricao,
            entry.procedimentos_realizados,
            entry.observacoes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// History of a patient, newest first.
pub fn list_historicos(
    conn: &Connection,
    paciente_id: i64,
    page: Page,
) -> Result<Paginated<Historico>, DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM historicos WHERE paciente_id = ?1",
        [paciente_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, paciente_id, data, descricao, procedimentos_realizados, observacoes
         FROM historicos WHERE paciente_id = ?1
         ORDER BY data DESC, id DESC LIMIT ?2 OFFSET ?3",
    )?;
    let items = stmt
        .query_map(params![paciente_id, page.limit(), page.offset()], |row| {
            Ok(Historico {
                id: row.get(0)?,
                paciente_id: row.get(1)?,
                data: row.get(2)?,
                descricao: row.get(3)?,
                procedimentos_realizados: row.get(4)?,
                observacoes: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(items, page, total))
}
