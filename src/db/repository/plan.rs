use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

fn plano_from_row(row: &Row<'_>) -> rusqlite::Result<PlanoTratamento> {
    Ok(PlanoTratamento {
        id: row.get(0)?,
        paciente_id: row.get(1)?,
        descricao: row.get(2)?,
        data_criacao: row.get(3)?,
        status: row.get(4)?,
        observacoes: row.get(5)?,
        orcamento_total: row.get(6)?,
    })
}

fn procedimento_from_row(row: &Row<'_>) -> rusqlite::Result<Procedimento> {
    let dentes: Option<String> = row.get(5)?;
    let quadrantes: Option<String> = row.get(6)?;
    Ok(Procedimento {
        id: row.get(0)?,
        plano_id: row.get(1)?,
        tratamento_id: row.get(2)?,
        descricao: row.get(3)?,
        dente: row.get(4)?,
        dentes_selecionados: dentes
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        quadrantes: split_quadrantes(quadrantes.as_deref()),
        boca_completa: row.get::<_, i64>(7)? != 0,
        valor: row.get(8)?,
        status: row.get(9)?,
        data_prevista: row.get(10)?,
        data_realizado: row.get(11)?,
        observacoes: row.get(12)?,
    })
}

fn split_quadrantes(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from)
        .collect()
}

const PLANO_COLUMNS: &str =
    "id, paciente_id, descricao, data_criacao, status, observacoes, orcamento_total_centavos";

const PROCEDIMENTO_COLUMNS: &str = "id, plano_id, tratamento_id, descricao, dente,
     dentes_selecionados, quadrantes, boca_completa, valor_centavos, status,
     data_prevista, data_realizado, observacoes";

pub fn insert_plano(
    conn: &Connection,
    paciente_id: i64,
    descricao: &str,
    status: PlanStatus,
    observacoes: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO plano_tratamento (paciente_id, descricao, data_criacao, status, observacoes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![paciente_id, descricao, now(), status, observacoes],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_plano(conn: &Connection, id: i64) -> Result<Option<PlanoTratamento>, DatabaseError> {
    let sql = format!("SELECT {PLANO_COLUMNS} FROM plano_tratamento WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], plano_from_row).optional()?)
}

/// Plans for a patient, newest first.
pub fn list_planos(
    conn: &Connection,
    paciente_id: i64,
) -> Result<Vec<PlanoTratamento>, DatabaseError> {
    let sql = format!(
        "SELECT {PLANO_COLUMNS} FROM plano_tratamento
         WHERE paciente_id = ?1 ORDER BY data_criacao DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([paciente_id], plano_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Recompute the stored budget from the plan's procedures.
pub fn recompute_orcamento(conn: &Connection, plano_id: i64) -> Result<Money, DatabaseError> {
    let total: Money = conn.query_row(
        "SELECT COALESCE(SUM(valor_centavos), 0) FROM procedimentos WHERE plano_id = ?1",
        [plano_id],
        |row| row.get(0),
    )?;
    let changed = conn.execute(
        "UPDATE plano_tratamento SET orcamento_total_centavos = ?2 WHERE id = ?1",
        params![plano_id, total],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("PlanoTratamento", plano_id));
    }
    Ok(total)
}

/// Insert a procedure; `proc.id` is ignored. Returns the new id.
pub fn insert_procedimento(conn: &Connection, proc: &Procedimento) -> Result<i64, DatabaseError> {
    let dentes = if proc.dentes_selecionados.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&proc.dentes_selecionados)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        )
    };
    let quadrantes = if proc.quadrantes.is_empty() {
        None
    } else {
        Some(proc.quadrantes.join(","))
    };

    conn.execute(
        "INSERT INTO procedimentos (plano_id, tratamento_id, descricao, dente,
         dentes_selecionados, quadrantes, boca_completa, valor_centavos, status,
         data_prevista, data_realizado, observacoes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            proc.plano_id,
            proc.tratamento_id,
            proc.descricao,
            proc.dente,
            dentes,
            quadrantes,
            proc.boca_completa as i32,
            proc.valor,
            proc.status,
            proc.data_prevista,
            proc.data_realizado,
            proc.observacoes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_procedimento(conn: &Connection, id: i64) -> Result<Option<Procedimento>, DatabaseError> {
    let sql = format!("SELECT {PROCEDIMENTO_COLUMNS} FROM procedimentos WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], procedimento_from_row).optional()?)
}

pub fn list_procedimentos(
    conn: &Connection,
    plano_id: i64,
) -> Result<Vec<Procedimento>, DatabaseError> {
    let sql = format!(
        "SELECT {PROCEDIMENTO_COLUMNS} FROM procedimentos WHERE plano_id = ?1 ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([plano_id], procedimento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_procedimento_valor(
    conn: &Connection,
    id: i64,
    valor: Money,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE procedimentos SET valor_centavos = ?2 WHERE id = ?1",
        params![id, valor],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Procedimento", id));
    }
    Ok(())
}

pub fn delete_procedimento(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM procedimentos WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Procedimento", id));
    }
    Ok(())
}

/// Mark a procedure as done, keeping an existing completion date.
pub fn mark_procedimento_realizado(
    conn: &Connection,
    id: i64,
    date: NaiveDate,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE procedimentos
         SET status = ?2, data_realizado = COALESCE(data_realizado, ?3)
         WHERE id = ?1",
        params![id, ProcedureStatus::Realizado, date],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Procedimento", id));
    }
    Ok(())
}

/// Procedure count by status, restricted to patients not soft-deleted.
pub fn count_procedimentos_ativos(
    conn: &Connection,
    status: ProcedureStatus,
) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM procedimentos pr
         JOIN plano_tratamento pl ON pl.id = pr.plano_id
         JOIN pacientes pa ON pa.id = pl.paciente_id
         WHERE pr.status = ?1 AND pa.deleted_at IS NULL",
        [status],
        |row| row.get(0),
    )?)
}
