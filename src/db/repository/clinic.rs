use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::*;

/// The clinic row, created with defaults when absent.
pub fn get_or_create_clinica(conn: &Connection) -> Result<Clinica, DatabaseError> {
    let ts = now();
    conn.execute(
        "INSERT OR IGNORE INTO clinica (id, nome, criado_em, atualizado_em)
         VALUES (1, 'OdontoClinic', ?1, ?1)",
        [ts],
    )?;
    Ok(conn.query_row(
        "SELECT nome, endereco, telefone, cidade, estado, cnpj, criado_em, atualizado_em
         FROM clinica WHERE id = 1",
        [],
        |row| {
            Ok(Clinica {
                nome: row.get(0)?,
                endereco: row.get(1)?,
                telefone: row.get(2)?,
                cidade: row.get(3)?,
                estado: row.get(4)?,
                cnpj: row.get(5)?,
                criado_em: row.get(6)?,
                atualizado_em: row.get(7)?,
            })
        },
    )?)
}

pub fn update_clinica(conn: &Connection, clinica: &Clinica) -> Result<(), DatabaseError> {
    get_or_create_clinica(conn)?;
    conn.execute(
        "UPDATE clinica SET nome = ?1, endereco = ?2, telefone = ?3, cidade = ?4,
         estado = ?5, cnpj = ?6, atualizado_em = ?7
         WHERE id = 1",
        params![
            clinica.nome,
            clinica.endereco,
            clinica.telefone,
            clinica.cidade,
            clinica.estado,
            clinica.cnpj,
            now(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};

    #[test]
    fn singleton_created_with_default_name() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let c = get_or_create_clinica(&conn).unwrap();
        assert_eq!(c.nome, "OdontoClinic");
        get_or_create_clinica(&conn).unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM clinica", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn update_persists() {
        let conn = open_memory_database(Bind::Users).unwrap();
        let mut c = get_or_create_clinica(&conn).unwrap();
        c.nome = "Sorriso".into();
        c.cidade = Some("Recife".into());
        c.estado = Some("PE".into());
        update_clinica(&conn, &c).unwrap();

        let stored = get_or_create_clinica(&conn).unwrap();
        assert_eq!(stored.nome, "Sorriso");
        assert_eq!(stored.local_padrao().as_deref(), Some("Recife - PE"));
    }
}
