use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{like_pattern, Page, Paginated};
use crate::db::DatabaseError;
use crate::models::*;

const PACIENTE_COLUMNS: &str = "id, nome, data_nascimento, sexo, cpf, telefone, celular, email,
     endereco, bairro, cidade, estado, cep, profissao, data_cadastro, deleted_at";

fn paciente_from_row(row: &Row<'_>) -> rusqlite::Result<Paciente> {
    Ok(Paciente {
        id: row.get(0)?,
        dados: PacienteDados {
            nome: row.get(1)?,
            data_nascimento: row.get(2)?,
            sexo: row.get(3)?,
            cpf: row.get(4)?,
            telefone: row.get(5)?,
            celular: row.get(6)?,
            email: row.get(7)?,
            endereco: row.get(8)?,
            bairro: row.get(9)?,
            cidade: row.get(10)?,
            estado: row.get(11)?,
            cep: row.get(12)?,
            profissao: row.get(13)?,
        },
        data_cadastro: row.get(14)?,
        deleted_at: row.get(15)?,
    })
}

pub fn insert_paciente(conn: &Connection, dados: &PacienteDados) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO pacientes (nome, data_nascimento, sexo, cpf, telefone, celular, email,
         endereco, bairro, cidade, estado, cep, profissao, data_cadastro)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            dados.nome,
            dados.data_nascimento,
            dados.sexo,
            dados.cpf,
            dados.telefone,
            dados.celular,
            dados.email,
            dados.endereco,
            dados.bairro,
            dados.cidade,
            dados.estado,
            dados.cep,
            dados.profissao,
            now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_paciente(
    conn: &Connection,
    id: i64,
    dados: &PacienteDados,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE pacientes SET nome = ?2, data_nascimento = ?3, sexo = ?4, cpf = ?5,
         telefone = ?6, celular = ?7, email = ?8, endereco = ?9, bairro = ?10,
         cidade = ?11, estado = ?12, cep = ?13, profissao = ?14
         WHERE id = ?1",
        params![
            id,
            dados.nome,
            dados.data_nascimento,
            dados.sexo,
            dados.cpf,
            dados.telefone,
            dados.celular,
            dados.email,
            dados.endereco,
            dados.bairro,
            dados.cidade,
            dados.estado,
            dados.cep,
            dados.profissao,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Paciente", id));
    }
    Ok(())
}

pub fn get_paciente(conn: &Connection, id: i64) -> Result<Option<Paciente>, DatabaseError> {
    let sql = format!("SELECT {PACIENTE_COLUMNS} FROM pacientes WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], paciente_from_row).optional()?)
}

/// Id of another patient already holding `cpf`.
pub fn find_cpf_owner(
    conn: &Connection,
    cpf: &str,
    exclude_id: Option<i64>,
) -> Result<Option<i64>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT id FROM pacientes WHERE cpf = ?1 AND (?2 IS NULL OR id != ?2)",
            params![cpf, exclude_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// Active patients ordered by name, optionally filtered by a name substring.
pub fn list_pacientes(
    conn: &Connection,
    busca: Option<&str>,
    page: Page,
) -> Result<Paginated<Paciente>, DatabaseError> {
    let pattern = busca.filter(|b| !b.trim().is_empty()).map(like_pattern);

    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pacientes
         WHERE deleted_at IS NULL AND (?1 IS NULL OR nome LIKE ?1)",
        params![pattern],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {PACIENTE_COLUMNS} FROM pacientes
         WHERE deleted_at IS NULL AND (?1 IS NULL OR nome LIKE ?1)
         ORDER BY nome COLLATE NOCASE LIMIT ?2 OFFSET ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params![pattern, page.limit(), page.offset()], paciente_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(items, page, total))
}

/// Set or clear the soft-delete marker.
pub fn set_paciente_deleted(
    conn: &Connection,
    id: i64,
    deleted_at: Option<NaiveDateTime>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE pacientes SET deleted_at = ?2 WHERE id = ?1",
        params![id, deleted_at],
    )?;
    if changed == 0 {
        return Err(DatabaseError::not_found("Paciente", id));
    }
    Ok(())
}

/// Active patients born in `month` (1-12), by day of month.
pub fn list_aniversariantes(conn: &Connection, month: u32) -> Result<Vec<Paciente>, DatabaseError> {
    let sql = format!(
        "SELECT {PACIENTE_COLUMNS} FROM pacientes
         WHERE deleted_at IS NULL AND data_nascimento IS NOT NULL
           AND CAST(strftime('%m', data_nascimento) AS INTEGER) = ?1
         ORDER BY strftime('%d', data_nascimento), nome"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([month], paciente_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `(id, nome)` of active patients whose name contains `term`.
pub fn search_paciente_nomes(
    conn: &Connection,
    term: &str,
    limit: i64,
) -> Result<Vec<(i64, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, nome FROM pacientes
         WHERE deleted_at IS NULL AND nome LIKE ?1
         ORDER BY nome COLLATE NOCASE LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![like_pattern(term), limit], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `(id, nome)` of every active patient.
pub fn list_pacientes_basico(conn: &Connection) -> Result<Vec<(i64, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, nome FROM pacientes WHERE deleted_at IS NULL ORDER BY nome COLLATE NOCASE",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Names starting with `q`, or with a word starting with `q`.
pub fn search_nomes_por_prefixo(
    conn: &Connection,
    q: &str,
    limit: i64,
) -> Result<Vec<String>, DatabaseError> {
    let q = q.trim();
    let mut stmt = conn.prepare(
        "SELECT nome FROM pacientes
         WHERE deleted_at IS NULL AND (nome LIKE ?1 OR nome LIKE ?2)
         ORDER BY nome COLLATE NOCASE LIMIT ?3",
    )?;
    let rows = stmt
        .query_map(params![format!("{q}%"), format!("% {q}%"), limit], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Mobile number for a patient name: exact (case-insensitive) match first,
/// then the first partial match.
pub fn find_celular_por_nome(conn: &Connection, nome: &str) -> Result<Option<String>, DatabaseError> {
    let nome = nome.trim();
    let exact: Option<Option<String>> = conn
        .query_row(
            "SELECT celular FROM pacientes
             WHERE deleted_at IS NULL AND lower(nome) = lower(?1) LIMIT 1",
            [nome],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(celular) = exact {
        return Ok(celular);
    }

    let partial: Option<Option<String>> = conn
        .query_row(
            "SELECT celular FROM pacientes
             WHERE deleted_at IS NULL AND nome LIKE ?1 ORDER BY nome LIMIT 1",
            [like_pattern(nome)],
            |row| row.get(0),
        )
        .optional()?;
    Ok(partial.flatten())
}

pub fn count_pacientes_ativos(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM pacientes WHERE deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?)
}

pub fn count_pacientes(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM pacientes", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::{open_memory_database, Bind};

    fn dados(nome: &str) -> PacienteDados {
        PacienteDados {
            nome: nome.into(),
            ..Default::default()
        }
    }

    #[test]
    fn insert_and_get() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let mut d = dados("Maria Silva");
        d.cpf = Some("529.982.247-25".into());
        d.sexo = Some(Sexo::Feminino);
        let id = insert_paciente(&conn, &d).unwrap();

        let p = get_paciente(&conn, id).unwrap().unwrap();
        assert_eq!(p.dados, d);
        assert!(!p.is_deleted());
        assert_eq!(find_cpf_owner(&conn, "529.982.247-25", None).unwrap(), Some(id));
        assert_eq!(find_cpf_owner(&conn, "529.982.247-25", Some(id)).unwrap(), None);
    }

    #[test]
    fn duplicate_cpf_rejected_by_index() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let mut d = dados("A");
        d.cpf = Some("529.982.247-25".into());
        insert_paciente(&conn, &d).unwrap();
        let err = insert_paciente(&conn, &d).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn list_excludes_deleted_and_filters() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        for i in 0..12 {
            insert_paciente(&conn, &dados(&format!("Paciente {i:02}"))).unwrap();
        }
        let gone = insert_paciente(&conn, &dados("Zeca Removido")).unwrap();
        set_paciente_deleted(&conn, gone, Some(now())).unwrap();

        let first = list_pacientes(&conn, None, Page::new(None, 10)).unwrap();
        assert_eq!(first.total, 12);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.pages, 2);

        let found = list_pacientes(&conn, Some("paciente 1"), Page::new(None, 10)).unwrap();
        assert_eq!(found.total, 2);

        assert_eq!(count_pacientes_ativos(&conn).unwrap(), 12);
        assert_eq!(count_pacientes(&conn).unwrap(), 13);
    }

    #[test]
    fn birthdays_by_month() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let mut a = dados("Abril");
        a.data_nascimento = NaiveDate::from_ymd_opt(1990, 4, 20);
        let mut b = dados("Maio");
        b.data_nascimento = NaiveDate::from_ymd_opt(1985, 5, 2);
        insert_paciente(&conn, &a).unwrap();
        insert_paciente(&conn, &b).unwrap();

        let abril = list_aniversariantes(&conn, 4).unwrap();
        assert_eq!(abril.len(), 1);
        assert_eq!(abril[0].dados.nome, "Abril");
    }

    #[test]
    fn prefix_and_word_search() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        insert_paciente(&conn, &dados("Ana Souza")).unwrap();
        insert_paciente(&conn, &dados("Mariana Lima")).unwrap();
        insert_paciente(&conn, &dados("Carla Anaya")).unwrap();

        let names = search_nomes_por_prefixo(&conn, "ana", 20).unwrap();
        assert_eq!(names, vec!["Ana Souza".to_string(), "Carla Anaya".to_string()]);
    }

    #[test]
    fn celular_exact_then_partial() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let mut a = dados("João");
        a.celular = Some("1111".into());
        let mut b = dados("João Pedro");
        b.celular = Some("2222".into());
        insert_paciente(&conn, &b).unwrap();
        insert_paciente(&conn, &a).unwrap();

        assert_eq!(find_celular_por_nome(&conn, "João").unwrap(), Some("1111".into()));
        assert_eq!(find_celular_por_nome(&conn, "Pedro").unwrap(), Some("2222".into()));
        assert_eq!(find_celular_por_nome(&conn, "Ninguém").unwrap(), None);
    }
}
