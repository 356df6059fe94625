use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Field values captured for a generated document.
pub type DocumentFields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documento {
    pub id: i64,
    pub paciente_id: Option<i64>,
    pub dentista_id: Option<i64>,
    pub tipo_documento: String,
    pub titulo_documento: String,
    pub conteudo: DocumentFields,
    pub data_emissao: NaiveDateTime,
    pub local_emissao: Option<String>,
    pub observacoes: Option<String>,
}

/// Dental certificate of absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atestado {
    pub id: i64,
    pub paciente: String,
    pub dias: u32,
    pub data_emissao: NaiveDateTime,
}
