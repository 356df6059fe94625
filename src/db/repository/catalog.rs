use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

fn categoria_from_row(row: &Row<'_>) -> rusqlite::Result<CategoriaTratamento> {
    Ok(CategoriaTratamento {
        id: row.get(0)?,
        nome: row.get(1)?,
        descricao: row.get(2)?,
    })
}

fn tratamento_from_row(row: &Row<'_>) -> rusqlite::Result<Tratamento> {
    Ok(Tratamento {
        id: row.get(0)?,
        categoria_id: row.get(1)?,
        nome: row.get(2)?,
        descricao: row.get(3)?,
        preco: row.get(4)?,
        duracao_estimada: row.get(5)?,
        data_criacao: row.get(6)?,
        ativo: row.get::<_, i64>(7)? != 0,
    })
}

const TRATAMENTO_COLUMNS: &str =
    "id, categoria_id, nome, descricao, preco_centavos, duracao_estimada, data_criacao, ativo";

pub fn list_categorias(conn: &Connection) -> Result<Vec<CategoriaTratamento>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, nome, descricao FROM categoria_tratamento ORDER BY nome COLLATE NOCASE",
    )?;
    let rows = stmt
        .query_map([], categoria_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_categoria(
    conn: &Connection,
    id: i64,
) -> Result<Option<CategoriaTratamento>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id, nome, descricao FROM categoria_tratamento WHERE id = ?1",
            [id],
            categoria_from_row,
        )
        .optional()?)
}

pub fn insert_categoria(
    conn: &Connection,
    nome: &str,
    descricao: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO categoria_tratamento (nome, descricao) VALUES (?1, ?2)",
        params![nome, descricao],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_categoria(
    conn: &Connection,
    id: i64,
    nome: &str,
    descricao: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE categoria_tratamento SET nome = ?2, descricao = ?3 WHERE id = ?1",
        params![id, nome, descricao],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("CategoriaTratamento", id));
    }
    Ok(())
}

/// Delete a category. Refused while treatments still reference it.
pub fn delete_categoria(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    if count_tratamentos(conn, id)? > 0 {
        return Err(DatabaseError::ConstraintViolation(
            "Categoria com tratamentos não pode ser removida".into(),
        ));
    }
    let changed = conn.execute("DELETE FROM categoria_tratamento WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("CategoriaTratamento", id));
    }
    Ok(())
}

pub fn count_tratamentos(conn: &Connection, categoria_id: i64) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM tratamento WHERE categoria_id = ?1",
        [categoria_id],
        |row| row.get(0),
    )?)
}

pub fn list_tratamentos(
    conn: &Connection,
    categoria_id: i64,
) -> Result<Vec<Tratamento>, DatabaseError> {
    let sql = format!(
        "SELECT {TRATAMENTO_COLUMNS} FROM tratamento WHERE categoria_id = ?1
         ORDER BY nome COLLATE NOCASE"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([categoria_id], tratamento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_tratamento(conn: &Connection, id: i64) -> Result<Option<Tratamento>, DatabaseError> {
    let sql = format!("SELECT {TRATAMENTO_COLUMNS} FROM tratamento WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], tratamento_from_row).optional()?)
}

/// Insert a treatment; `t.id` and `t.data_criacao` are ignored.
pub fn insert_tratamento(conn: &Connection, t: &Tratamento) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO tratamento (categoria_id, nome, descricao, preco_centavos,
         duracao_estimada, data_criacao, ativo)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            t.categoria_id,
            t.nome,
            t.descricao,
            t.preco,
            t.duracao_estimada,
            now(),
            t.ativo as i32,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_tratamento(conn: &Connection, t: &Tratamento) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE tratamento SET nome = ?2, descricao = ?3, preco_centavos = ?4,
         duracao_estimada = ?5, ativo = ?6
         WHERE id = ?1",
        params![
            t.id,
            t.nome,
            t.descricao,
            t.preco,
            t.duracao_estimada,
            t.ativo as i32,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Tratamento", t.id));
    }
    Ok(())
}

pub fn delete_tratamento(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM tratamento WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Tratamento", id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    fn tratamento(categoria_id: i64, nome: &str) -> Tratamento {
        Tratamento {
            id: 0,
            categoria_id,
            nome: nome.into(),
            descricao: None,
            preco: Money::from_cents(25_000),
            duracao_estimada: Some("1h".into()),
            data_criacao: now(),
            ativo: true,
        }
    }

    #[test]
    fn category_with_treatments_cannot_be_deleted() {
        let conn = open_memory_database(Bind::Tratamentos).unwrap();
        let cat = insert_categoria(&conn, "Endodontia", None).unwrap();
        let t = insert_tratamento(&conn, &tratamento(cat, "Canal")).unwrap();

        let err = delete_categoria(&conn, cat).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));

        delete_tratamento(&conn, t).unwrap();
        delete_categoria(&conn, cat).unwrap();
        assert!(get_categoria(&conn, cat).unwrap().is_none());
    }

    #[test]
    fn category_names_are_unique() {
        let conn = open_memory_database(Bind::Tratamentos).unwrap();
        insert_categoria(&conn, "Prótese", None).unwrap();
        assert!(insert_categoria(&conn, "Prótese", None).unwrap_err().is_unique_violation());
    }

    #[test]
    fn treatments_sorted_by_name() {
        let conn = open_memory_database(Bind::Tratamentos).unwrap();
        let cat = insert_categoria(&conn, "Dentística", Some("Restaurações")).unwrap();
        insert_tratamento(&conn, &tratamento(cat, "Resina")).unwrap();
        insert_tratamento(&conn, &tratamento(cat, "Amálgama")).unwrap();

        let list = list_tratamentos(&conn, cat).unwrap();
        assert_eq!(list[0].nome, "Amálgama");
        assert_eq!(list[1].preco.cents(), 25_000);

        let mut edited = list[1].clone();
        edited.ativo = false;
        update_tratamento(&conn, &edited).unwrap();
        assert!(!get_tratamento(&conn, edited.id).unwrap().unwrap().ativo);
    }
}
