use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Medication reference entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Medicamento {
    pub id: i64,
    pub categoria: Option<String>,
    pub principio_ativo: String,
    pub nome_referencia: Option<String>,
    pub apresentacao: Option<String>,
    pub posologia: Option<String>,
    pub uso: Option<String>,
    pub indicacoes: Option<String>,
    pub mecanismo_acao: Option<String>,
    pub contraindicacoes: Option<String>,
    pub efeitos_colaterais: Option<String>,
    pub interacoes_medicamentosas: Option<String>,
    pub risco_gravidez: Option<String>,
    pub tipo_receita: Option<String>,
    pub alerta_principal: Option<String>,
    pub instrucao_compra: Option<String>,
    pub observacao: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeloReceita {
    pub id: i64,
    pub titulo: String,
    pub conteudo: String,
    pub usuario_id: Option<i64>,
    pub criado_em: NaiveDateTime,
}
