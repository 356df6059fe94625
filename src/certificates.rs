//! Dental certificates of absence (atestados).

use serde::Deserialize;

use crate::documents::clinic_header;
use crate::models::{Atestado, Clinica};
use crate::patients::format_br_date;
use crate::pdf::{attachment_name, PdfError, PdfWriter};

/// How many certificates the listing shows.
pub const LIST_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Paciente obrigatório")]
    MissingPatient,

    #[error(transparent)]
    Pdf(#[from] PdfError),
}

/// Form input; `dias` arrives as free text or a number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AtestadoInput {
    #[serde(default)]
    pub paciente: String,
    #[serde(default)]
    pub dias: Option<serde_json::Value>,
}

/// Days of leave; anything unparsable or below one means a single day.
pub fn parse_dias(raw: Option<&serde_json::Value>) -> u32 {
    let parsed = match raw {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.filter(|d| *d >= 1).unwrap_or(1)
}

impl AtestadoInput {
    /// Trimmed patient name and days.
    pub fn validate(&self) -> Result<(&str, u32), CertificateError> {
        let paciente = self.paciente.trim();
        if paciente.is_empty() {
            return Err(CertificateError::MissingPatient);
        }
        Ok((paciente, parse_dias(self.dias.as_ref())))
    }
}

pub fn certificate_text(atestado: &Atestado) -> String {
    let plural = if atestado.dias == 1 { "dia" } else { "dias" };
    format!(
        "Atesto para os devidos fins que {} esteve sob tratamento odontológico \
         nesta data, necessitando de {} {} de afastamento de suas atividades.",
        atestado.paciente, atestado.dias, plural
    )
}

/// A4 certificate with the clinic header and a signature line.
pub fn certificate_pdf(
    atestado: &Atestado,
    clinica: &Clinica,
) -> Result<(Vec<u8>, String), CertificateError> {
    let mut w = PdfWriter::new("Atestado")?;
    for (i, line) in clinic_header(clinica).iter().enumerate() {
        if i == 0 {
            w.heading(line, 12.0);
        } else {
            w.line(line, 10.0);
        }
    }
    w.space(8.0);
    w.centered("ATESTADO ODONTOLÓGICO", 16.0, true);
    w.space(8.0);
    w.paragraph(&certificate_text(atestado), 11.0, 90);
    w.space(12.0);
    let date = format_br_date(atestado.data_emissao.date());
    w.line(
        &match clinica.local_padrao() {
            Some(l) => format!("{l}, {date}"),
            None => date,
        },
        11.0,
    );
    w.space(14.0);
    w.line(&"_".repeat(50), 11.0);
    w.line("Cirurgião(ã)-Dentista", 11.0);
    let bytes = w.finish()?;
    Ok((bytes, attachment_name(&format!("Atestado_{}", atestado.paciente))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, open_memory_database, Bind};
    use crate::models::now;
    use serde_json::json;

    #[test]
    fn dias_parsing_falls_back_to_one() {
        assert_eq!(parse_dias(Some(&json!("3"))), 3);
        assert_eq!(parse_dias(Some(&json!(5))), 5);
        assert_eq!(parse_dias(Some(&json!("três"))), 1);
        assert_eq!(parse_dias(Some(&json!(0))), 1);
        assert_eq!(parse_dias(Some(&json!(-2))), 1);
        assert_eq!(parse_dias(None), 1);
    }

    #[test]
    fn patient_is_required() {
        let input = AtestadoInput {
            paciente: "   ".into(),
            dias: Some(json!("2")),
        };
        assert_eq!(input.validate().unwrap_err().to_string(), "Paciente obrigatório");
    }

    #[test]
    fn stored_and_rendered() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let input = AtestadoInput {
            paciente: " Carlos Dias ".into(),
            dias: Some(json!("x")),
        };
        let (paciente, dias) = input.validate().unwrap();
        let id = db::insert_atestado(&conn, paciente, dias).unwrap();
        let atestado = db::get_atestado(&conn, id).unwrap().unwrap();
        assert_eq!(atestado.dias, 1);
        assert!(certificate_text(&atestado).contains("1 dia de afastamento"));

        let clinica = Clinica {
            nome: "OdontoClinic".into(),
            endereco: None,
            telefone: None,
            cidade: None,
            estado: None,
            cnpj: None,
            criado_em: now(),
            atualizado_em: now(),
        };
        let (bytes, name) = certificate_pdf(&atestado, &clinica).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(name, "Atestado_Carlos_Dias.pdf");
    }
}
