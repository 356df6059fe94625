use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::*;

/// Fetch the patient's ficha, creating an empty one on first access.
pub fn get_or_create_ficha(conn: &Connection, paciente_id: i64) -> Result<Ficha, DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO fichas (paciente_id) VALUES (?1)",
        [paciente_id],
    )?;
    Ok(conn.query_row(
        "SELECT paciente_id, responsavel, contato_emergencia, convenio, numero_convenio,
         alergias, observacoes FROM fichas WHERE paciente_id = ?1",
        [paciente_id],
        |row| {
            Ok(Ficha {
                paciente_id: row.get(0)?,
                responsavel: row.get(1)?,
                contato_emergencia: row.get(2)?,
                convenio: row.get(3)?,
                numero_convenio: row.get(4)?,
                alergias: row.get(5)?,
                observacoes: row.get(6)?,
            })
        },
    )?)
}

pub fn save_ficha(conn: &Connection, ficha: &Ficha) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO fichas (paciente_id, responsavel, contato_emergencia, convenio,
         numero_convenio, alergias, observacoes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(paciente_id) DO UPDATE SET
           responsavel = excluded.responsavel,
           contato_emergencia = excluded.contato_emergencia,
           convenio = excluded.convenio,
           numero_convenio = excluded.numero_convenio,
           alergias = excluded.alergias,
           observacoes = excluded.observacoes",
        params![
            ficha.paciente_id,
            ficha.responsavel,
            ficha.contato_emergencia,
            ficha.convenio,
            ficha.numero_convenio,
            ficha.alergias,
            ficha.observacoes,
        ],
    )?;
    Ok(())
}

/// Fetch the patient's anamnese, creating an empty one on first access.
pub fn get_or_create_anamnese(
    conn: &Connection,
    paciente_id: i64,
) -> Result<Anamnese, DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO anamneses (paciente_id) VALUES (?1)",
        [paciente_id],
    )?;
    Ok(conn.query_row(
        "SELECT paciente_id, historico_medico, medicamentos_uso, cirurgias_previas,
         doencas_cronicas, habitos, problemas_dentarios, ultima_visita_dentista,
         ultima_atualizacao FROM anamneses WHERE paciente_id = ?1",
        [paciente_id],
        |row| {
            Ok(Anamnese {
                paciente_id: row.get(0)?,
                historico_medico: row.get(1)?,
                medicamentos_uso: row.get(2)?,
                cirurgias_previas: row.get(3)?,
                doencas_cronicas: row.get(4)?,
                habitos: row.get(5)?,
                problemas_dentarios: row.get(6)?,
                ultima_visita_dentista: row.get(7)?,
                ultima_atualizacao: row.get(8)?,
            })
        },
    )?)
}

/// Store the anamnese and stamp `ultima_atualizacao`.
pub fn save_anamnese(conn: &Connection, anamnese: &Anamnese) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO anamneses (paciente_id, historico_medico, medicamentos_uso,
         cirurgias_previas, doencas_cronicas, habitos, problemas_dentarios,
         ultima_visita_dentista, ultima_atualizacao)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(paciente_id) DO UPDATE SET
           historico_medico = excluded.historico_medico,
           medicamentos_uso = excluded.medicamentos_uso,
           cirurgias_previas = excluded.cirurgias_previas,
           doencas_cronicas = excluded.doencas_cronicas,
           habitos = excluded.habitos,
           problemas_dentarios = excluded.problemas_dentarios,
           ultima_visita_dentista = excluded.ultima_visita_dentista,
           ultima_atualizacao = excluded.ultima_atualizacao",
        params![
            anamnese.paciente_id,
            anamnese.historico_medico,
            anamnese.medicamentos_uso,
            anamnese.cirurgias_previas,
            anamnese.doencas_cronicas,
            anamnese.habitos,
            anamnese.problemas_dentarios,
            anamnese.ultima_visita_dentista,
            now(),
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_paciente, open_memory_database, Bind};

    fn paciente(conn: &Connection) -> i64 {
        insert_paciente(
            conn,
            &PacienteDados {
                nome: "Teste".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn ficha_created_lazily_once() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let id = paciente(&conn);

        let ficha = get_or_create_ficha(&conn, id).unwrap();
        assert_eq!(ficha.paciente_id, id);
        assert!(ficha.alergias.is_none());
        get_or_create_ficha(&conn, id).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fichas", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn ficha_update_persists() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let id = paciente(&conn);
        let mut ficha = get_or_create_ficha(&conn, id).unwrap();
        ficha.alergias = Some("Penicilina".into());
        save_ficha(&conn, &ficha).unwrap();

        assert_eq!(
            get_or_create_ficha(&conn, id).unwrap().alergias.as_deref(),
            Some("Penicilina")
        );
    }

    #[test]
    fn anamnese_save_stamps_update_time() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let id = paciente(&conn);
        let mut anamnese = get_or_create_anamnese(&conn, id).unwrap();
        assert!(anamnese.ultima_atualizacao.is_none());

        anamnese.habitos = Some("Bruxismo".into());
        save_anamnese(&conn, &anamnese).unwrap();

        let stored = get_or_create_anamnese(&conn, id).unwrap();
        assert_eq!(stored.habitos.as_deref(), Some("Bruxismo"));
        assert!(stored.ultima_atualizacao.is_some());
    }
}
