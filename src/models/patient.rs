use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::enums::{EntryKind, EntryStatus, PaymentMethod, PlanStatus, ProcedureStatus, Sexo};
use super::money::Money;

/// Validated demographic fields, shared by insert and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacienteDados {
    pub nome: String,
    pub data_nascimento: Option<NaiveDate>,
    pub sexo: Option<Sexo>,
    pub cpf: Option<String>,
    pub telefone: Option<String>,
    pub celular: Option<String>,
    pub email: Option<String>,
    pub endereco: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub cep: Option<String>,
    pub profissao: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paciente {
    pub id: i64,
    #[serde(flatten)]
    pub dados: PacienteDados,
    pub data_cadastro: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl Paciente {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Age in whole years on `today`.
    pub fn idade_em(&self, today: NaiveDate) -> Option<i32> {
        let birth = self.dados.data_nascimento?;
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        Some(age)
    }

    pub fn idade(&self) -> Option<i32> {
        self.idade_em(super::today())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ficha {
    pub paciente_id: i64,
    pub responsavel: Option<String>,
    pub contato_emergencia: Option<String>,
    pub convenio: Option<String>,
    pub numero_convenio: Option<String>,
    pub alergias: Option<String>,
    pub observacoes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Anamnese {
    pub paciente_id: i64,
    pub historico_medico: Option<String>,
    pub medicamentos_uso: Option<String>,
    pub cirurgias_previas: Option<String>,
    pub doencas_cronicas: Option<String>,
    pub habitos: Option<String>,
    pub problemas_dentarios: Option<String>,
    pub ultima_visita_dentista: Option<String>,
    pub ultima_atualizacao: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanoTratamento {
    pub id: i64,
    pub paciente_id: i64,
    pub descricao: String,
    pub data_criacao: NaiveDateTime,
    pub status: PlanStatus,
    pub observacoes: Option<String>,
    pub orcamento_total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Procedimento {
    pub id: i64,
    pub plano_id: i64,
    pub tratamento_id: Option<i64>,
    pub descricao: String,
    pub dente: Option<String>,
    pub dentes_selecionados: Vec<String>,
    pub quadrantes: Vec<String>,
    pub boca_completa: bool,
    pub valor: Money,
    pub status: ProcedureStatus,
    pub data_prevista: Option<NaiveDate>,
    pub data_realizado: Option<NaiveDate>,
    pub observacoes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Historico {
    pub id: i64,
    pub paciente_id: i64,
    pub data: NaiveDateTime,
    pub descricao: String,
    pub procedimentos_realizados: Option<String>,
    pub observacoes: Option<String>,
}

/// One ledger line (`financeiro`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lancamento {
    pub id: i64,
    pub paciente_id: i64,
    pub plano_id: Option<i64>,
    pub procedimento_id: Option<i64>,
    pub data_lancamento: NaiveDateTime,
    pub descricao: String,
    pub valor: Money,
    pub tipo: EntryKind,
    pub forma_pagamento: Option<PaymentMethod>,
    pub status: EntryStatus,
    pub data_pagamento: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paciente_nascido(date: NaiveDate) -> Paciente {
        Paciente {
            id: 1,
            dados: PacienteDados {
                nome: "Ana".into(),
                data_nascimento: Some(date),
                ..Default::default()
            },
            data_cadastro: NaiveDate::from_ymd_opt(2020, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            deleted_at: None,
        }
    }

    #[test]
    fn idade_before_and_after_birthday() {
        let p = paciente_nascido(NaiveDate::from_ymd_opt(1990, 6, 15).unwrap());
        assert_eq!(p.idade_em(NaiveDate::from_ymd_opt(2024, 6, 14).unwrap()), Some(33));
        assert_eq!(p.idade_em(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()), Some(34));
        assert_eq!(p.idade_em(NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()), Some(34));
    }

    #[test]
    fn idade_unknown_without_birth_date() {
        let mut p = paciente_nascido(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        p.dados.data_nascimento = None;
        assert_eq!(p.idade(), None);
    }

    #[test]
    fn flattened_json_shape() {
        let p = paciente_nascido(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["nome"], "Ana");
        assert_eq!(json["data_nascimento"], "1990-01-01");
        assert!(json.get("dados").is_none());
    }
}
