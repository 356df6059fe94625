use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

const DOCUMENTO_COLUMNS: &str = "id, paciente_id, dentista_id, tipo_documento, titulo_documento,
     conteudo_json, data_emissao, local_emissao, observacoes";

fn documento_from_row(row: &Row<'_>) -> rusqlite::Result<Documento> {
    let raw: Option<String> = row.get(5)?;
    Ok(Documento {
        id: row.get(0)?,
        paciente_id: row.get(1)?,
        dentista_id: row.get(2)?,
        tipo_documento: row.get(3)?,
        titulo_documento: row.get(4)?,
        conteudo: raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default(),
        data_emissao: row.get(6)?,
        local_emissao: row.get(7)?,
        observacoes: row.get(8)?,
    })
}

/// Insert a document; `doc.id` is ignored.
pub fn insert_documento(conn: &Connection, doc: &Documento) -> Result<i64, DatabaseError> {
    let conteudo = serde_json::to_string(&doc.conteudo)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    conn.execute(
        "INSERT INTO documentos (paciente_id, dentista_id, tipo_documento, titulo_documento,
         conteudo_json, data_emissao, local_emissao, observacoes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            doc.paciente_id,
            doc.dentista_id,
            doc.tipo_documento,
            doc.titulo_documento,
            conteudo,
            doc.data_emissao,
            doc.local_emissao,
            doc.observacoes,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_documento(conn: &Connection, id: i64) -> Result<Option<Documento>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENTO_COLUMNS} FROM documentos WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], documento_from_row).optional()?)
}

/// Most recently issued documents first.
pub fn list_documentos_recentes(
    conn: &Connection,
    limit: i64,
) -> Result<Vec<Documento>, DatabaseError> {
    let sql = format!(
        "SELECT {DOCUMENTO_COLUMNS} FROM documentos ORDER BY data_emissao DESC, id DESC LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([limit], documento_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_documento_metadados(
    conn: &Connection,
    id: i64,
    titulo: &str,
    observacoes: Option<&str>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE documentos SET titulo_documento = ?2, observacoes = ?3 WHERE id = ?1",
        params![id, titulo, observacoes],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Documento", id));
    }
    Ok(())
}

pub fn delete_documento(conn: &Connection, id: i64) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM documentos WHERE id = ?1", [id])?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Documento", id));
    }
    Ok(())
}

pub fn count_documentos(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM documentos", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    fn doc(titulo: &str) -> Documento {
        let mut conteudo = DocumentFields::new();
        conteudo.insert("motivo".into(), "Extração".into());
        conteudo.insert("itens".into(), serde_json::json!(["a", "b"]));
        Documento {
            id: 0,
            paciente_id: None,
            dentista_id: Some(3),
            tipo_documento: "declaracao".into(),
            titulo_documento: titulo.into(),
            conteudo,
            data_emissao: now(),
            local_emissao: Some("Recife - PE".into()),
            observacoes: None,
        }
    }

    #[test]
    fn content_json_round_trips() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let original = doc("Declaração");
        let id = insert_documento(&conn, &original).unwrap();
        let stored = get_documento(&conn, id).unwrap().unwrap();
        assert_eq!(stored.conteudo, original.conteudo);
        assert_eq!(stored.dentista_id, Some(3));
    }

    #[test]
    fn metadata_edit_and_delete() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let id = insert_documento(&conn, &doc("Antigo")).unwrap();
        update_documento_metadados(&conn, id, "Novo", Some("obs")).unwrap();
        let stored = get_documento(&conn, id).unwrap().unwrap();
        assert_eq!(stored.titulo_documento, "Novo");
        assert_eq!(stored.observacoes.as_deref(), Some("obs"));

        assert_eq!(count_documentos(&conn).unwrap(), 1);
        delete_documento(&conn, id).unwrap();
        assert!(list_documentos_recentes(&conn, 10).unwrap().is_empty());
    }
}
