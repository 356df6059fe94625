use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::db::DatabaseError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Values travel as their literal both in JSON and in SQLite columns.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: DatabaseError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

str_enum!(Sexo {
    Masculino => "Masculino",
    Feminino => "Feminino",
});

str_enum!(PlanStatus {
    Pendente => "Pendente",
    EmAndamento => "Em andamento",
    Concluido => "Concluído",
    Cancelado => "Cancelado",
});

str_enum!(ProcedureStatus {
    Pendente => "Pendente",
    Realizado => "Realizado",
    Cancelado => "Cancelado",
});

str_enum!(EntryKind {
    Credito => "Crédito",
    Debito => "Débito",
});

str_enum!(EntryStatus {
    Pendente => "Pendente",
    Pago => "Pago",
    Cancelado => "Cancelado",
});

str_enum!(PaymentMethod {
    Dinheiro => "Dinheiro",
    CartaoCredito => "Cartão de Crédito",
    CartaoDebito => "Cartão de Débito",
    Pix => "Pix",
    Transferencia => "Transferência",
    Boleto => "Boleto",
});

str_enum!(Cargo {
    Admin => "admin",
    Gerente => "gerente",
    Dentista => "dentista",
    Atendimento => "atendimento",
    Financeiro => "financeiro",
    Secretaria => "secretaria",
});

str_enum!(SignatureKind {
    Dentista => "dentista",
    Clinica => "clinica",
});

impl Cargo {
    /// Staff allowed to touch clinical records.
    pub const CLINICO: &'static [Cargo] = &[Cargo::Admin, Cargo::Gerente, Cargo::Dentista];
    /// Staff allowed to touch the ledger.
    pub const FINANCEIRO_ALL: &'static [Cargo] =
        &[Cargo::Admin, Cargo::Gerente, Cargo::Financeiro];

    /// Users listed as agenda professionals.
    pub fn is_professional(&self) -> bool {
        matches!(self, Cargo::Dentista | Cargo::Admin)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn accented_values_round_trip() {
        assert_eq!(PlanStatus::from_str("Concluído").unwrap(), PlanStatus::Concluido);
        assert_eq!(EntryKind::Debito.as_str(), "Débito");
        assert_eq!(
            PaymentMethod::from_str("Cartão de Crédito").unwrap(),
            PaymentMethod::CartaoCredito
        );
    }

    #[test]
    fn unknown_value_is_invalid_enum() {
        let err = Cargo::from_str("root").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_literal() {
        let json = serde_json::to_string(&PlanStatus::EmAndamento).unwrap();
        assert_eq!(json, "\"Em andamento\"");
        let parsed: EntryStatus = serde_json::from_str("\"Pago\"").unwrap();
        assert_eq!(parsed, EntryStatus::Pago);
    }

    #[test]
    fn sqlite_column_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let value: ProcedureStatus = conn
            .query_row("SELECT ?1", [ProcedureStatus::Realizado], |r| r.get(0))
            .unwrap();
        assert_eq!(value, ProcedureStatus::Realizado);

        let bad: rusqlite::Result<Cargo> = conn.query_row("SELECT 'root'", [], |r| r.get(0));
        assert!(bad.is_err());
    }

    #[test]
    fn role_groups() {
        assert!(Cargo::CLINICO.contains(&Cargo::Dentista));
        assert!(!Cargo::CLINICO.contains(&Cargo::Financeiro));
        assert!(Cargo::FINANCEIRO_ALL.contains(&Cargo::Financeiro));
        assert!(Cargo::Admin.is_professional());
        assert!(!Cargo::Secretaria.is_professional());
    }
}
