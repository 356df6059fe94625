//! Patient rules shared by the record, plan and ledger endpoints.
//!
//! CPF normalisation, Brazilian date parsing, ledger totals and the
//! clinic dashboard aggregate live here; persistence is in `db`.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{self, DatabaseError};
use crate::models::{
    now, EntryKind, EntryStatus, Historico, Lancamento, Money, PacienteDados, PaymentMethod,
    PlanStatus, Procedimento, ProcedureStatus, Sexo,
};

const NOME_MAX: usize = 100;
const DESCRICAO_MAX: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CpfError {
    #[error("CPF deve conter 11 dígitos")]
    WrongLength,
    #[error("CPF inválido")]
    Invalid,
}

/// Validation failures of patient-side forms.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatientError {
    #[error("Nome obrigatório")]
    MissingName,
    #[error("Nome deve ter no máximo 100 caracteres")]
    NameTooLong,
    #[error("Data inválida, use dd/mm/aaaa")]
    InvalidDate,
    #[error("Sexo inválido")]
    InvalidSexo,
    #[error("Descrição obrigatória")]
    MissingDescription,
    #[error("Descrição deve ter no máximo 200 caracteres")]
    DescriptionTooLong,
    #[error("valor não pode ser negativo")]
    NegativeValue,
    #[error("Valor obrigatório")]
    MissingValue,
    #[error(transparent)]
    Cpf(#[from] CpfError),
}

/// Normalise a CPF to `XXX.XXX.XXX-YY`.
///
/// Blank input yields `None`. Without validation, inputs that do not
/// have 11 digits come back as bare digits.
pub fn normalize_cpf(raw: Option<&str>, validate: bool) -> Result<Option<String>, CpfError> {
    let raw = match raw.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(None),
    };
    let digits: Vec<u32> = raw.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        if validate {
            return Err(CpfError::WrongLength);
        }
        return Ok(Some(digits.iter().map(|d| d.to_string()).collect()));
    }
    if validate {
        if digits.iter().all(|d| *d == digits[0]) {
            return Err(CpfError::Invalid);
        }
        if check_digit(&digits[..9]) != digits[9] || check_digit(&digits[..10]) != digits[10] {
            return Err(CpfError::Invalid);
        }
    }
    let s: String = digits.iter().map(|d| char::from(b'0' + *d as u8)).collect();
    Ok(Some(format!(
        "{}.{}.{}-{}",
        &s[0..3],
        &s[3..6],
        &s[6..9],
        &s[9..11]
    )))
}

fn check_digit(prefix: &[u32]) -> u32 {
    let weight_start = prefix.len() as u32 + 1;
    let sum: u32 = prefix
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let dv = (sum * 10) % 11;
    if dv == 10 {
        0
    } else {
        dv
    }
}

/// `dd/mm/aaaa`
pub fn parse_br_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y").ok()
}

pub fn format_br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required_description(raw: &str) -> Result<String, PatientError> {
    let descricao = raw.trim();
    if descricao.is_empty() {
        return Err(PatientError::MissingDescription);
    }
    if descricao.chars().count() > DESCRICAO_MAX {
        return Err(PatientError::DescriptionTooLong);
    }
    Ok(descricao.to_string())
}

/// Raw patient form; `data_nascimento` is `dd/mm/aaaa`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PacienteForm {
    pub nome: String,
    pub data_nascimento: Option<String>,
    pub sexo: Option<String>,
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

impl PacienteForm {
    /// Validate and normalise. CPF uniqueness is checked by the caller.
    pub fn validate(&self) -> Result<PacienteDados, PatientError> {
        let nome = self.nome.trim();
        if nome.is_empty() {
            return Err(PatientError::MissingName);
        }
        if nome.chars().count() > NOME_MAX {
            return Err(PatientError::NameTooLong);
        }
        let data_nascimento = match clean(&self.data_nascimento) {
            Some(raw) => Some(parse_br_date(&raw).ok_or(PatientError::InvalidDate)?),
            None => None,
        };
        let sexo = match clean(&self.sexo) {
            Some(raw) => Some(Sexo::from_str(&raw).map_err(|_| PatientError::InvalidSexo)?),
            None => None,
        };
        Ok(PacienteDados {
            nome: nome.to_string(),
            data_nascimento,
            sexo,
            cpf: normalize_cpf(self.cpf.as_deref(), true)?,
            telefone: clean(&self.telefone),
            celular: clean(&self.celular),
            email: clean(&self.email),
            endereco: clean(&self.endereco),
            bairro: clean(&self.bairro),
            cidade: clean(&self.cidade),
            estado: clean(&self.estado),
            cep: clean(&self.cep),
            profissao: clean(&self.profissao),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanoForm {
    pub descricao: String,
    pub status: Option<PlanStatus>,
    pub observacoes: Option<String>,
}

impl PlanoForm {
    pub fn validate(&self) -> Result<(String, PlanStatus, Option<String>), PatientError> {
        Ok((
            required_description(&self.descricao)?,
            self.status.unwrap_or(PlanStatus::Pendente),
            clean(&self.observacoes),
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcedimentoForm {
    pub tratamento_id: Option<i64>,
    pub descricao: String,
    pub dente: Option<String>,
    pub dentes_selecionados: Vec<String>,
    pub quadrantes: Vec<String>,
    pub boca_completa: bool,
    pub valor: Option<Money>,
    pub status: Option<ProcedureStatus>,
    pub data_prevista: Option<NaiveDate>,
    pub data_realizado: Option<NaiveDate>,
    pub observacoes: Option<String>,
}

impl ProcedimentoForm {
    pub fn into_procedimento(self, plano_id: i64) -> Result<Procedimento, PatientError> {
        let valor = self.valor.unwrap_or(Money::ZERO);
        if valor.is_negative() {
            return Err(PatientError::NegativeValue);
        }
        Ok(Procedimento {
            id: 0,
            plano_id,
            tratamento_id: self.tratamento_id,
            descricao: required_description(&self.descricao)?,
            dente: clean(&self.dente),
            dentes_selecionados: self.dentes_selecionados,
            quadrantes: self.quadrantes,
            boca_completa: self.boca_completa,
            valor,
            status: self.status.unwrap_or(ProcedureStatus::Pendente),
            data_prevista: self.data_prevista,
            data_realizado: self.data_realizado,
            observacoes: clean(&self.observacoes),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoricoForm {
    pub descricao: String,
    pub procedimentos_realizados: Option<String>,
    pub observacoes: Option<String>,
}

impl HistoricoForm {
    pub fn into_historico(self, paciente_id: i64) -> Result<Historico, PatientError> {
        let descricao = self.descricao.trim();
        if descricao.is_empty() {
            return Err(PatientError::MissingDescription);
        }
        Ok(Historico {
            id: 0,
            paciente_id,
            data: now(),
            descricao: descricao.to_string(),
            procedimentos_realizados: clean(&self.procedimentos_realizados),
            observacoes: clean(&self.observacoes),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LancamentoForm {
    #[serde(default)]
    pub descricao: String,
    #[serde(default)]
    pub valor: Option<Money>,
    pub tipo: EntryKind,
    #[serde(default)]
    pub forma_pagamento: Option<PaymentMethod>,
    #[serde(default)]
    pub status: Option<EntryStatus>,
    #[serde(default)]
    pub data_pagamento: Option<NaiveDate>,
    #[serde(default)]
    pub procedimento_id: Option<i64>,
}

impl LancamentoForm {
    /// Ledger line for `paciente_id`; `plano_id` comes from the
    /// referenced procedure, when there is one.
    pub fn into_lancamento(
        self,
        paciente_id: i64,
        plano_id: Option<i64>,
    ) -> Result<Lancamento, PatientError> {
        let valor = self.valor.ok_or(PatientError::MissingValue)?;
        Ok(Lancamento {
            id: 0,
            paciente_id,
            plano_id,
            procedimento_id: self.procedimento_id,
            data_lancamento: now(),
            descricao: required_description(&self.descricao)?,
            valor,
            tipo: self.tipo,
            forma_pagamento: self.forma_pagamento,
            status: self.status.unwrap_or(EntryStatus::Pendente),
            data_pagamento: self.data_pagamento,
        })
    }
}

/// Ledger totals. Cancelled entries are ignored; the balance counts
/// only paid credits against every remaining debit and may go negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FinancialTotals {
    pub total_credito: Money,
    pub total_debito: Money,
    pub creditos_pagos: Money,
    pub saldo: Money,
}

pub fn financial_totals<'a>(entries: impl IntoIterator<Item = &'a Lancamento>) -> FinancialTotals {
    let mut totals = FinancialTotals::default();
    for entry in entries {
        if entry.status == EntryStatus::Cancelado {
            continue;
        }
        match entry.tipo {
            EntryKind::Credito => {
                totals.total_credito += entry.valor;
                if entry.status == EntryStatus::Pago {
                    totals.creditos_pagos += entry.valor;
                }
            }
            EntryKind::Debito => totals.total_debito += entry.valor,
        }
    }
    totals.saldo = totals.creditos_pagos - totals.total_debito;
    totals
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub total_pacientes: i64,
    pub procedimentos_pendentes: i64,
    pub procedimentos_realizados: i64,
    pub saldo_global: Money,
    pub saldo_global_filtrado: Option<Money>,
}

/// `[inicio 00:00:00, fim 23:59:59]` when both dates parse.
pub fn period_bounds(inicio: &str, fim: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = parse_br_date(inicio)?;
    let end = parse_br_date(fim)?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)?;
    Some((start.and_time(NaiveTime::MIN), end.and_time(end_of_day)))
}

/// Clinic-wide counters over non-deleted patients.
pub fn dashboard(
    conn: &Connection,
    period: Option<(NaiveDateTime, NaiveDateTime)>,
) -> Result<Dashboard, DatabaseError> {
    let all = db::lancamentos_no_periodo(conn, None, None)?;
    let saldo_global_filtrado = match period {
        Some((from, to)) => {
            let filtered = db::lancamentos_no_periodo(conn, Some(from), Some(to))?;
            Some(financial_totals(&filtered).saldo)
        }
        None => None,
    };
    Ok(Dashboard {
        total_pacientes: db::count_pacientes_ativos(conn)?,
        procedimentos_pendentes: db::count_procedimentos_ativos(conn, ProcedureStatus::Pendente)?,
        procedimentos_realizados: db::count_procedimentos_ativos(conn, ProcedureStatus::Realizado)?,
        saldo_global: financial_totals(&all).saldo,
        saldo_global_filtrado,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, Bind};
    use crate::models::{now, PacienteDados};

    fn lanc(tipo: EntryKind, status: EntryStatus, cents: i64) -> Lancamento {
        Lancamento {
            id: 0,
            paciente_id: 1,
            plano_id: None,
            procedimento_id: None,
            data_lancamento: now(),
            descricao: "x".into(),
            valor: Money::from_cents(cents),
            tipo,
            forma_pagamento: None,
            status,
            data_pagamento: None,
        }
    }

    #[test]
    fn cpf_formats_valid_numbers() {
        assert_eq!(
            normalize_cpf(Some("529.982.247-25"), true).unwrap().as_deref(),
            Some("529.982.247-25")
        );
        assert_eq!(
            normalize_cpf(Some("52998224725"), true).unwrap().as_deref(),
            Some("529.982.247-25")
        );
    }

    #[test]
    fn cpf_rejections() {
        assert_eq!(normalize_cpf(Some("123"), true), Err(CpfError::WrongLength));
        assert_eq!(normalize_cpf(Some("111.111.111-11"), true), Err(CpfError::Invalid));
        assert_eq!(normalize_cpf(Some("529.982.247-24"), true), Err(CpfError::Invalid));
    }

    #[test]
    fn cpf_blank_and_lenient() {
        assert_eq!(normalize_cpf(None, true), Ok(None));
        assert_eq!(normalize_cpf(Some("  "), true), Ok(None));
        assert_eq!(normalize_cpf(Some("12-3"), false).unwrap().as_deref(), Some("123"));
        // Check digits only matter when validating
        assert_eq!(
            normalize_cpf(Some("11111111111"), false).unwrap().as_deref(),
            Some("111.111.111-11")
        );
    }

    #[test]
    fn totals_skip_cancelled_and_count_paid_credits() {
        let entries = vec![
            lanc(EntryKind::Credito, EntryStatus::Pago, 10_000),
            lanc(EntryKind::Credito, EntryStatus::Pendente, 5_000),
            lanc(EntryKind::Debito, EntryStatus::Pendente, 30_000),
            lanc(EntryKind::Debito, EntryStatus::Cancelado, 99_900),
        ];
        let t = financial_totals(&entries);
        assert_eq!(t.total_credito.cents(), 15_000);
        assert_eq!(t.total_debito.cents(), 30_000);
        assert_eq!(t.creditos_pagos.cents(), 10_000);
        assert_eq!(t.saldo.cents(), -20_000);
    }

    #[test]
    fn totals_saturate_instead_of_overflowing() {
        let entries = vec![
            lanc(EntryKind::Credito, EntryStatus::Pago, i64::MAX),
            lanc(EntryKind::Credito, EntryStatus::Pago, i64::MAX),
            lanc(EntryKind::Debito, EntryStatus::Pendente, i64::MAX),
        ];
        let t = financial_totals(&entries);
        assert_eq!(t.total_credito.cents(), i64::MAX);
        assert_eq!(t.saldo.cents(), 0);
    }

    #[test]
    fn br_dates() {
        assert_eq!(
            parse_br_date("05/03/1990"),
            NaiveDate::from_ymd_opt(1990, 3, 5)
        );
        assert!(parse_br_date("1990-03-05").is_none());
        assert!(period_bounds("01/01/2024", "nope").is_none());
        let (from, to) = period_bounds("01/01/2024", "31/01/2024").unwrap();
        assert_eq!(from.to_string(), "2024-01-01 00:00:00");
        assert_eq!(to.to_string(), "2024-01-31 23:59:59");
    }

    #[test]
    fn dashboard_ignores_deleted_patients() {
        let conn = open_memory_database(Bind::Pacientes).unwrap();
        let ativo = db::insert_paciente(
            &conn,
            &PacienteDados {
                nome: "Ativo".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let removido = db::insert_paciente(
            &conn,
            &PacienteDados {
                nome: "Removido".into(),
                ..Default::default()
            },
        )
        .unwrap();
        for paciente_id in [ativo, removido] {
            let mut entry = lanc(EntryKind::Credito, EntryStatus::Pago, 1_000);
            entry.paciente_id = paciente_id;
            db::insert_lancamento(&conn, &entry).unwrap();
        }
        db::set_paciente_deleted(&conn, removido, Some(now())).unwrap();

        let d = dashboard(&conn, None).unwrap();
        assert_eq!(d.total_pacientes, 1);
        assert_eq!(d.saldo_global.cents(), 1_000);
        assert!(d.saldo_global_filtrado.is_none());
    }

    #[test]
    fn patient_form_normalises_fields() {
        let form = PacienteForm {
            nome: "  Ana Souza ".into(),
            data_nascimento: Some("05/03/1990".into()),
            sexo: Some("Feminino".into()),
            cpf: Some("52998224725".into()),
            email: Some("   ".into()),
            ..Default::default()
        };
        let dados = form.validate().unwrap();
        assert_eq!(dados.nome, "Ana Souza");
        assert_eq!(dados.cpf.as_deref(), Some("529.982.247-25"));
        assert_eq!(dados.sexo, Some(Sexo::Feminino));
        assert_eq!(dados.email, None);
    }

    #[test]
    fn patient_form_errors() {
        let mut form = PacienteForm {
            nome: "Ana".into(),
            data_nascimento: Some("1990-03-05".into()),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap_err().to_string(), "Data inválida, use dd/mm/aaaa");
        form.data_nascimento = None;
        form.cpf = Some("123".into());
        assert_eq!(form.validate().unwrap_err().to_string(), "CPF deve conter 11 dígitos");
        form.nome = "x".repeat(101);
        assert_eq!(form.validate(), Err(PatientError::NameTooLong));
        form.nome = " ".into();
        assert_eq!(form.validate(), Err(PatientError::MissingName));
    }

    #[test]
    fn procedure_form_rejects_negative_value() {
        let form = ProcedimentoForm {
            descricao: "Restauração".into(),
            valor: Some(Money::from_cents(-100)),
            ..Default::default()
        };
        assert_eq!(
            form.into_procedimento(1).unwrap_err().to_string(),
            "valor não pode ser negativo"
        );
        let ok = ProcedimentoForm {
            descricao: "Restauração".into(),
            ..Default::default()
        }
        .into_procedimento(7)
        .unwrap();
        assert_eq!(ok.plano_id, 7);
        assert_eq!(ok.valor, Money::ZERO);
        assert_eq!(ok.status, ProcedureStatus::Pendente);
    }

    #[test]
    fn ledger_form_requires_value() {
        let form: LancamentoForm =
            serde_json::from_value(serde_json::json!({"descricao": "Consulta", "tipo": "Crédito"}))
                .unwrap();
        assert!(matches!(
            form.into_lancamento(1, None),
            Err(PatientError::MissingValue)
        ));

        let form: LancamentoForm = serde_json::from_value(serde_json::json!({
            "descricao": "Consulta",
            "tipo": "Crédito",
            "valor": "150,50",
            "status": "Pago"
        }))
        .unwrap();
        let entry = form.into_lancamento(1, Some(4)).unwrap();
        assert_eq!(entry.valor.cents(), 15_050);
        assert_eq!(entry.plano_id, Some(4));
    }

    #[test]
    fn ledger_form_rejects_absurd_amounts() {
        let result = serde_json::from_value::<LancamentoForm>(serde_json::json!({
            "descricao": "Consulta",
            "tipo": "Crédito",
            "valor": 1e300
        }));
        assert!(result.is_err());
    }

}
