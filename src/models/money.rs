//! Monetary amounts stored as integer centavos.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Largest accepted magnitude, in reais, for amounts read from input.
pub const MAX_REAIS: f64 = 1e12;

/// Arithmetic saturates at the `i64` bounds instead of overflowing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// `None` for non-finite values and magnitudes above [`MAX_REAIS`].
    pub fn from_reais(value: f64) -> Option<Self> {
        if !value.is_finite() || value.abs() > MAX_REAIS {
            return None;
        }
        Some(Money((value * 100.0).round() as i64))
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn as_reais(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Parse user input, accepting a comma as decimal separator.
    pub fn parse(input: &str) -> Option<Money> {
        let normalized = input.trim().replace(',', ".");
        if normalized.is_empty() {
            return None;
        }
        normalized.parse::<f64>().ok().and_then(Money::from_reais)
    }

    /// `R$ 1.234,56`
    pub fn format_brl(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let reais = (abs / 100).to_string();
        let mut grouped = String::new();
        for (i, ch) in reais.chars().enumerate() {
            if i > 0 && (reais.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        format!("{sign}R$ {grouped},{:02}", abs % 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.as_reais())
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_reais())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let parsed = match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Money::from_reais(n),
            Raw::Text(s) => Money::parse(&s),
        };
        parsed.ok_or_else(|| serde::de::Error::custom("valor inválido"))
    }
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(Money)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_decimal() {
        assert_eq!(Money::parse("150,50"), Some(Money::from_cents(15050)));
        assert_eq!(Money::parse("99.9"), Some(Money::from_cents(9990)));
        assert_eq!(Money::parse("abc"), None);
        assert_eq!(Money::parse(""), None);
    }

    #[test]
    fn float_input_rounds_to_cents() {
        assert_eq!(Money::from_reais(0.1 + 0.2), Some(Money::from_cents(30)));
    }

    #[test]
    fn out_of_range_amounts_are_rejected() {
        assert_eq!(Money::from_reais(1e300), None);
        assert_eq!(Money::from_reais(-2e12), None);
        assert_eq!(Money::from_reais(f64::NAN), None);
        assert_eq!(Money::parse("1e300"), None);
        assert_eq!(
            Money::from_reais(MAX_REAIS),
            Some(Money::from_cents(100_000_000_000_000))
        );

        assert!(serde_json::from_str::<Money>("1e300").is_err());
        assert!(serde_json::from_str::<Money>("\"5000000000000\"").is_err());
    }

    #[test]
    fn arithmetic_saturates() {
        let max = Money::from_cents(i64::MAX);
        assert_eq!(max + Money::from_cents(1), max);
        let mut acc = max;
        acc += max;
        assert_eq!(acc, max);
        assert_eq!(Money::from_cents(i64::MIN) - Money::from_cents(1), Money::from_cents(i64::MIN));
        assert_eq!(-Money::from_cents(i64::MIN), max);
    }

    #[test]
    fn brl_formatting() {
        assert_eq!(Money::from_cents(123456).format_brl(), "R$ 1.234,56");
        assert_eq!(Money::from_cents(5).format_brl(), "R$ 0,05");
        assert_eq!(Money::from_cents(-100000).format_brl(), "-R$ 1.000,00");
    }

    #[test]
    fn json_accepts_numbers_and_strings() {
        let a: Money = serde_json::from_str("12.5").unwrap();
        let b: Money = serde_json::from_str("\"12,50\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "12.5");
    }

    #[test]
    fn sums() {
        let total: Money = [100, 250, -50].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 300);
    }
}
