use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Page, Paginated};
use crate::db::DatabaseError;
use crate::models::*;

const LANCAMENTO_COLUMNS: &str = "id, paciente_id, plano_id, procedimento_id, data_lancamento,
     descricao, valor_centavos, tipo, forma_pagamento, status, data_pagamento";

fn lancamento_from_row(row: &Row<'_>) -> rusqlite::Result<Lancamento> {
    Ok(Lancamento {
        id: row.get(0)?,
        paciente_id: row.get(1)?,
        plano_id: row.get(2)?,
        procedimento_id: row.get(3)?,
        data_lancamento: row.get(4)?,
        descricao: row.get(5)?,
        valor: row.get(6)?,
        tipo: row.get(7)?,
        forma_pagamento: row.get(8)?,
        status: row.get(9)?,
        data_pagamento: row.get(10)?,
    })
}

/// Insert a ledger entry; `entry.id` is ignored.
pub fn insert_lancamento(conn: &Connection, entry: &Lancamento) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO financeiro (paciente_id, plano_id, procedimento_id, data_lancamento,
         descricao, valor_centavos, tipo, forma_pagamento, status, data_pagamento)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            entry.paciente_id,
            entry.plano_id,
            entry.procedimento_id,
            entry.data_lancamento,
            entry.descricao,
            entry.valor,
            entry.tipo,
            entry.forma_pagamento,
            entry.status,
            entry.data_pagamento,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_lancamento(conn: &Connection, id: i64) -> Result<Option<Lancamento>, DatabaseError> {
    let sql = format!("SELECT {LANCAMENTO_COLUMNS} FROM financeiro WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], lancamento_from_row).optional()?)
}

pub fn delete_lancamento(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM financeiro WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Financeiro", id));
    }
    Ok(())
}

/// Ledger page for a patient, newest first.
pub fn list_lancamentos(
    conn: &Connection,
    paciente_id: i64,
    page: Page,
) -> Result<Paginated<Lancamento>, DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM financeiro WHERE paciente_id = ?1",
        [paciente_id],
        |row| row.get(0),
    )?;
    let sql = format!(
        "SELECT {LANCAMENTO_COLUMNS} FROM financeiro WHERE paciente_id = ?1
         ORDER BY data_lancamento DESC, id DESC LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params![paciente_id, page.limit(), page.offset()], lancamento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Paginated::new(items, page, total))
}

pub fn lancamentos_do_paciente(
    conn: &Connection,
    paciente_id: i64,
) -> Result<Vec<Lancamento>, DatabaseError> {
    let sql = format!("SELECT {LANCAMENTO_COLUMNS} FROM financeiro WHERE paciente_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([paciente_id], lancamento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn lancamentos_do_plano(
    conn: &Connection,
    plano_id: i64,
) -> Result<Vec<Lancamento>, DatabaseError> {
    let sql = format!("SELECT {LANCAMENTO_COLUMNS} FROM financeiro WHERE plano_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([plano_id], lancamento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Entries of non-deleted patients, optionally restricted to
/// `data_lancamento` in `[from, to]`.
pub fn lancamentos_no_periodo(
    conn: &Connection,
    from: Option<NaiveDateTime>,
    to: Option<NaiveDateTime>,
) -> Result<Vec<Lancamento>, DatabaseError> {
    let sql = format!(
        "SELECT {LANCAMENTO_COLUMNS} FROM financeiro
         WHERE paciente_id IN (SELECT id FROM pacientes WHERE deleted_at IS NULL)
           AND (?1 IS NULL OR data_lancamento >= ?1)
           AND (?2 IS NULL OR data_lancamento <= ?2)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![from, to], lancamento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
