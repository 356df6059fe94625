use rusqlite::{params, Connection, OptionalExtension, Row};

use super::like_pattern;
use crate::db::DatabaseError;
use crate::models::*;

const MEDICAMENTO_COLUMNS: &str = "id, categoria, principio_ativo, nome_referencia, apresentacao,
     posologia, uso, indicacoes, mecanismo_acao, contraindicacoes, efeitos_colaterais,
     interacoes_medicamentosas, risco_gravidez, tipo_receita, alerta_principal,
     instrucao_compra, observacao";

/// Text columns covered by the advanced search.
const SEARCHABLE_COLUMNS: &[&str] = &[
    "categoria",
    "principio_ativo",
    "nome_referencia",
    "apresentacao",
    "posologia",
    "uso",
    "indicacoes",
    "mecanismo_acao",
    "contraindicacoes",
    "efeitos_colaterais",
    "interacoes_medicamentosas",
    "risco_gravidez",
    "tipo_receita",
    "alerta_principal",
    "instrucao_compra",
    "observacao",
];

fn medicamento_from_row(row: &Row<'_>) -> rusqlite::Result<Medicamento> {
    Ok(Medicamento {
        id: row.get(0)?,
        categoria: row.get(1)?,
        principio_ativo: row.get(2)?,
        nome_referencia: row.get(3)?,
        apresentacao: row.get(4)?,
        posologia: row.get(5)?,
        uso: row.get(6)?,
        indicacoes: row.get(7)?,
        mecanismo_acao: row.get(8)?,
        contraindicacoes: row.get(9)?,
        efeitos_colaterais: row.get(10)?,
        interacoes_medicamentosas: row.get(11)?,
        risco_gravidez: row.get(12)?,
        tipo_receita: row.get(13)?,
        alerta_principal: row.get(14)?,
        instrucao_compra: row.get(15)?,
        observacao: row.get(16)?,
    })
}

fn query_medicamentos(
    conn: &Connection,
    tail_sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Medicamento>, DatabaseError> {
    let sql = format!("SELECT {MEDICAMENTO_COLUMNS} FROM medicamentos {tail_sql}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, medicamento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a medication; `m.id` is ignored.
pub fn insert_medicamento(conn: &Connection, m: &Medicamento) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO medicamentos (categoria, principio_ativo, nome_referencia, apresentacao,
         posologia, uso, indicacoes, mecanismo_acao, contraindicacoes, efeitos_colaterais,
         interacoes_medicamentosas, risco_gravidez, tipo_receita, alerta_principal,
         instrucao_compra, observacao)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            m.categoria,
            m.principio_ativo,
            m.nome_referencia,
            m.apresentacao,
            m.posologia,
            m.uso,
            m.indicacoes,
            m.mecanismo_acao,
            m.contraindicacoes,
            m.efeitos_colaterais,
            m.interacoes_medicamentosas,
            m.risco_gravidez,
            m.tipo_receita,
            m.alerta_principal,
            m.instrucao_compra,
            m.observacao,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn count_medicamentos(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM medicamentos", [], |row| row.get(0))?)
}

/// Medications by active ingredient, optionally limited.
pub fn list_medicamentos(
    conn: &Connection,
    limit: Option<i64>,
) -> Result<Vec<Medicamento>, DatabaseError> {
    query_medicamentos(
        conn,
        "ORDER BY principio_ativo COLLATE NOCASE LIMIT ?1",
        [limit.unwrap_or(-1)],
    )
}

pub fn get_medicamento(conn: &Connection, id: i64) -> Result<Option<Medicamento>, DatabaseError> {
    let sql = format!("SELECT {MEDICAMENTO_COLUMNS} FROM medicamentos WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], medicamento_from_row).optional()?)
}

/// Substring search across every text column.
pub fn search_medicamentos_completo(
    conn: &Connection,
    termo: &str,
) -> Result<Vec<Medicamento>, DatabaseError> {
    let clauses = SEARCHABLE_COLUMNS
        .iter()
        .map(|c| format!("{c} LIKE ?1"))
        .collect::<Vec<_>>()
        .join(" OR ");
    query_medicamentos(
        conn,
        &format!("WHERE {clauses} ORDER BY principio_ativo COLLATE NOCASE"),
        [like_pattern(termo)],
    )
}

/// Quick lookup by ingredient, brand or category.
pub fn search_medicamentos_rapido(
    conn: &Connection,
    q: &str,
    limit: i64,
) -> Result<Vec<Medicamento>, DatabaseError> {
    query_medicamentos(
        conn,
        "WHERE principio_ativo LIKE ?1 OR nome_referencia LIKE ?1 OR categoria LIKE ?1
         ORDER BY principio_ativo COLLATE NOCASE LIMIT ?2",
        params![like_pattern(q), limit],
    )
}

fn modelo_from_row(row: &Row<'_>) -> rusqlite::Result<ModeloReceita> {
    Ok(ModeloReceita {
        id: row.get(0)?,
        titulo: row.get(1)?,
        conteudo: row.get(2)?,
        usuario_id: row.get(3)?,
        criado_em: row.get(4)?,
    })
}

pub fn list_modelos_receita(conn: &Connection) -> Result<Vec<ModeloReceita>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, titulo, conteudo, usuario_id, criado_em FROM modelos_receita
         ORDER BY titulo COLLATE NOCASE",
    )?;
    let rows = stmt
        .query_map([], modelo_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_modelo_receita(
    conn: &Connection,
    id: i64,
) -> Result<Option<ModeloReceita>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, titulo, conteudo, usuario_id, criado_em FROM modelos_receita WHERE id = ?1",
            [id],
            modelo_from_row,
        )
        .optional()?)
}

pub fn insert_modelo_receita(
    conn: &Connection,
    titulo: &str,
    conteudo: &str,
    usuario_id: Option<i64>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO modelos_receita (titulo, conteudo, usuario_id, criado_em)
         VALUES (?1, ?2, ?3, ?4)",
        params![titulo, conteudo, usuario_id, now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_modelo_receita(
    conn: &Connection,
    id: i64,
    titulo: &str,
    conteudo: &str,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE modelos_receita SET titulo = ?2, conteudo = ?3 WHERE id = ?1",
        params![id, titulo, conteudo],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("ModeloReceita", id));
    }
    Ok(())
}

pub fn delete_modelo_receita(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM modelos_receita WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("ModeloReceita", id));
    }
    Ok(())
}

pub fn count_modelos_receita(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM modelos_receita", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    fn med(principio: &str, categoria: &str, contraindicacoes: &str) -> Medicamento {
        Medicamento {
            principio_ativo: principio.into(),
            categoria: Some(categoria.into()),
            contraindicacoes: Some(contraindicacoes.into()),
            ..Default::default()
        }
    }

    #[test]
    fn full_search_reaches_every_column() {
        let conn = open_memory_database(Bind::Receitas).unwrap();
        insert_medicamento(&conn, &med("Amoxicilina", "Antibiótico", "Alergia a penicilinas")).unwrap();
        insert_medicamento(&conn, &med("Dipirona", "Analgésico", "Discrasias sanguíneas")).unwrap();

        let found = search_medicamentos_completo(&conn, "penicilina").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].principio_ativo, "Amoxicilina");

        // Quick search ignores contraindications
        assert!(search_medicamentos_rapido(&conn, "penicilina", 50).unwrap().is_empty());
        assert_eq!(search_medicamentos_rapido(&conn, "analg", 50).unwrap().len(), 1);
    }

    #[test]
    fn list_respects_limit() {
        let conn = open_memory_database(Bind::Receitas).unwrap();
        for name in ["C", "A", "B"] {
            insert_medicamento(&conn, &med(name, "x", "y")).unwrap();
        }
        let all = list_medicamentos(&conn, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].principio_ativo, "A");
        assert_eq!(list_medicamentos(&conn, Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn template_crud() {
        let conn = open_memory_database(Bind::Receitas).unwrap();
        let id = insert_modelo_receita(&conn, "Pós-extração", "Dipirona 500mg", Some(1)).unwrap();
        update_modelo_receita(&conn, id, "Pós-extração", "Paracetamol 750mg").unwrap();
        assert_eq!(
            get_modelo_receita(&conn, id).unwrap().unwrap().conteudo,
            "Paracetamol 750mg"
        );
        assert_eq!(count_modelos_receita(&conn).unwrap(), 1);
        delete_modelo_receita(&conn, id).unwrap();
        assert!(get_modelo_receita(&conn, id).unwrap().is_none());
    }
}
