use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::money::Money;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoriaTratamento {
    pub id: i64,
    pub nome: String,
    pub descricao: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tratamento {
    pub id: i64,
    pub categoria_id: i64,
    pub nome: String,
    pub descricao: Option<String>,
    pub preco: Money,
    pub duracao_estimada: Option<String>,
    pub data_criacao: NaiveDateTime,
    pub ativo: bool,
}
