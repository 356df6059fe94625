pub mod agenda;
pub mod catalog;
pub mod document;
pub mod enums;
pub mod money;
pub mod patient;
pub mod prescription;
pub mod user;

pub use agenda::*;
pub use catalog::*;
pub use document::*;
pub use enums::*;
pub use money::Money;
pub use patient::*;
pub use prescription::*;
pub use user::*;

use chrono::{NaiveDate, NaiveDateTime};

/// Wall-clock timestamp used for every stored date.
pub fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub fn today() -> NaiveDate {
    now().date()
}
