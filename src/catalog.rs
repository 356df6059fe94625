//! Treatment catalogue forms: categories and priced treatments.

use serde::Deserialize;
use serde_json::Value;

use crate::models::{now, Money, Tratamento};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Nome obrigatório")]
    MissingName,
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_name(nome: &str) -> Result<String, CatalogError> {
    let nome = nome.trim();
    if nome.is_empty() {
        return Err(CatalogError::MissingName);
    }
    Ok(nome.to_string())
}

/// Price from a form value. Accepts a decimal comma; anything else,
/// including out-of-range amounts, is zero.
pub fn parse_preco(raw: Option<&Value>) -> Money {
    match raw {
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(Money::from_reais)
            .unwrap_or(Money::ZERO),
        Some(Value::String(s)) => Money::parse(s).unwrap_or(Money::ZERO),
        _ => Money::ZERO,
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoriaForm {
    pub nome: String,
    pub descricao: Option<String>,
}

impl CategoriaForm {
    pub fn validate(&self) -> Result<(String, Option<String>), CatalogError> {
        Ok((required_name(&self.nome)?, clean(&self.descricao)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TratamentoForm {
    pub nome: String,
    pub descricao: Option<String>,
    pub preco: Option<Value>,
    pub duracao_estimada: Option<String>,
    pub ativo: bool,
}

impl Default for TratamentoForm {
    fn default() -> Self {
        Self {
            nome: String::new(),
            descricao: None,
            preco: None,
            duracao_estimada: None,
            ativo: true,
        }
    }
}

impl TratamentoForm {
    pub fn into_tratamento(self, categoria_id: i64) -> Result<Tratamento, CatalogError> {
        Ok(Tratamento {
            id: 0,
            categoria_id,
            nome: required_name(&self.nome)?,
            descricao: clean(&self.descricao),
            preco: parse_preco(self.preco.as_ref()),
            duracao_estimada: clean(&self.duracao_estimada),
            data_criacao: now(),
            ativo: self.ativo,
        })
    }

    /// Overwrite the editable fields of an existing treatment.
    pub fn apply_to(self, tratamento: &mut Tratamento) -> Result<(), CatalogError> {
        let updated = self.into_tratamento(tratamento.categoria_id)?;
        tratamento.nome = updated.nome;
        tratamento.descricao = updated.descricao;
        tratamento.preco = updated.preco;
        tratamento.duracao_estimada = updated.duracao_estimada;
        tratamento.ativo = updated.ativo;
        Ok(())
    }
}
