//! Prescription templates, the medication reference and prescription PDFs.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, DatabaseError};
use crate::documents::clinic_header;
use crate::models::{Clinica, Medicamento, Paciente, User};
use crate::patients::format_br_date;
use crate::pdf::{attachment_name, PdfError, PdfWriter};

/// Upper bound of the quick JSON search.
pub const QUICK_SEARCH_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum PrescriptionError {
    #[error("Já existem medicamentos")]
    AlreadySeeded,

    #[error("Título e conteúdo obrigatórios")]
    MissingTemplateFields,

    #[error("Conteúdo da receita obrigatório")]
    MissingContent,

    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn example_medications() -> [Medicamento; 2] {
    [
        Medicamento {
            categoria: Some("Analgesico".into()),
            principio_ativo: "Paracetamol".into(),
            apresentacao: Some("500mg comprimido".into()),
            posologia: Some("1 comp a cada 6-8h se dor".into()),
            ..Default::default()
        },
        Medicamento {
            categoria: Some("Antinflamatorio".into()),
            principio_ativo: "Ibuprofeno".into(),
            apresentacao: Some("600mg comprimido".into()),
            posologia: Some("1 comp 8/8h por 3 dias".into()),
            ..Default::default()
        },
    ]
}

/// Insert the example medications into an empty table.
pub fn seed_medicamentos(conn: &Connection) -> Result<usize, PrescriptionError> {
    if db::count_medicamentos(conn)? > 0 {
        return Err(PrescriptionError::AlreadySeeded);
    }
    let examples = example_medications();
    for m in &examples {
        db::insert_medicamento(conn, m)?;
    }
    tracing::info!(count = examples.len(), "Seeded example medications");
    Ok(examples.len())
}

/// Compact row used by both JSON searches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicamentoItem {
    pub id: i64,
    pub principio_ativo: String,
    pub apresentacao: Option<String>,
    pub categoria: Option<String>,
}

impl From<Medicamento> for MedicamentoItem {
    fn from(m: Medicamento) -> Self {
        Self {
            id: m.id,
            principio_ativo: m.principio_ativo,
            apresentacao: m.apresentacao,
            categoria: m.categoria,
        }
    }
}

/// Prescriber card for the prescription form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DentistaDados {
    pub id: i64,
    pub nome_completo: Option<String>,
    pub cro: String,
    pub username: String,
}

impl From<User> for DentistaDados {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            nome_completo: u.nome_completo,
            cro: u.cro.unwrap_or_default(),
            username: u.username,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeloInput {
    #[serde(default)]
    pub titulo: String,
    #[serde(default)]
    pub conteudo: String,
}

impl ModeloInput {
    /// Trimmed `(titulo, conteudo)`, both required.
    pub fn validate(&self) -> Result<(&str, &str), PrescriptionError> {
        let titulo = self.titulo.trim();
        let conteudo = self.conteudo.trim();
        if titulo.is_empty() || conteudo.is_empty() {
            return Err(PrescriptionError::MissingTemplateFields);
        }
        Ok((titulo, conteudo))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceitaInput {
    pub paciente_id: i64,
    pub dentista_id: i64,
    #[serde(default)]
    pub conteudo: String,
}

/// Issue a prescription as an A4 PDF. Returns the bytes and the download name.
pub fn prescription_pdf(
    paciente: &Paciente,
    dentista: &User,
    clinica: &Clinica,
    conteudo: &str,
) -> Result<(Vec<u8>, String), PrescriptionError> {
    let conteudo = conteudo.trim();
    if conteudo.is_empty() {
        return Err(PrescriptionError::MissingContent);
    }
    let mut w = PdfWriter::new("Receituário")?;
    for (i, line) in clinic_header(clinica).iter().enumerate() {
        if i == 0 {
            w.heading(line, 12.0);
        } else {
            w.line(line, 10.0);
        }
    }
    w.space(6.0);
    w.centered("RECEITUÁRIO", 16.0, true);
    w.space(6.0);
    w.line(&format!("Paciente: {}", paciente.dados.nome), 11.0);
    if let Some(idade) = paciente.idade() {
        w.line(&format!("Idade: {idade} anos"), 11.0);
    }
    w.space(6.0);
    w.paragraph(conteudo, 11.0, 90);
    w.space(12.0);

    let date = format_br_date(crate::models::today());
    let local = clinica.local_padrao();
    w.line(
        &match local {
            Some(l) => format!("{l}, {date}"),
            None => date,
        },
        11.0,
    );
    w.space(10.0);
    w.line(&"_".repeat(50), 11.0);
    w.line(dentista.display_name(), 11.0);
    if let Some(cro) = dentista.cro.as_deref().filter(|c| !c.is_empty()) {
        w.line(&format!("CRO: {cro}"), 11.0);
    }
    let bytes = w.finish()?;
    Ok((bytes, attachment_name(&format!("Receita_{}", paciente.dados.nome))))
}
