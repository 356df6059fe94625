use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::Cargo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub nome_completo: Option<String>,
    pub cro: Option<String>,
    pub nome_profissional: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub cargo: Cargo,
    pub is_active: bool,
    pub criado_em: NaiveDateTime,
    pub failed_login_count: u32,
    pub locked_until: Option<NaiveDateTime>,
    pub last_password_change: Option<NaiveDateTime>,
}

impl User {
    /// Name shown on the agenda and on signed documents.
    pub fn display_name(&self) -> &str {
        self.nome_profissional
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.nome_completo.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.username)
    }

    pub fn has_role(&self, roles: &[Cargo]) -> bool {
        roles.contains(&self.cargo)
    }
}

/// Clinic singleton used in document headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinica {
    pub nome: String,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub cnpj: Option<String>,
    pub criado_em: NaiveDateTime,
    pub atualizado_em: NaiveDateTime,
}

impl Clinica {
    /// "cidade - estado" when both are known.
    pub fn local_padrao(&self) -> Option<String> {
        match (self.cidade.as_deref(), self.estado.as_deref()) {
            (Some(c), Some(e)) if !c.is_empty() && !e.is_empty() => Some(format!("{c} - {e}")),
            (Some(c), _) if !c.is_empty() => Some(c.to_string()),
            _ => None,
        }
    }
}
