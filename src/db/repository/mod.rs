//! Repository layer: entity-scoped database operations.
//!
//! Each sub-module works against the connection of one bind.
//! All public functions are re-exported here.

mod calendar;
mod catalog;
mod certificate;
mod clinic;
mod document;
mod financial;
mod history;
mod holiday;
mod patient;
mod plan;
mod prescription;
mod record;
mod setting;
mod user;

use serde::Serialize;

pub use calendar::*;
pub use catalog::*;
pub use certificate::*;
pub use clinic::*;
pub use document::*;
pub use financial::*;
pub use history::*;
pub use holiday::*;
pub use patient::*;
pub use plan::*;
pub use prescription::*;
pub use record::*;
pub use setting::*;
pub use user::*;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// A page of results plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total: i64) -> Self {
        let per_page = i64::from(page.per_page);
        let pages = ((total + per_page - 1) / per_page).max(0) as u32;
        Self {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
            pages,
            has_next: page.page < pages,
            has_prev: page.page > 1,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            pages: self.pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// `%term%` for LIKE filters.
pub(crate) fn like_pattern(term: &str) -> String {
    format!("%{}%", term.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_offsets() {
        let page = Page::new(Some(3), 10);
        assert_eq!(page.offset(), 20);
        assert_eq!(Page::new(Some(0), 10).page, 1);
        assert_eq!(Page::new(None, 20).offset(), 0);
    }

    #[test]
    fn paginated_metadata() {
        let p = Paginated::new(vec![1, 2], Page::new(Some(2), 10), 21);
        assert_eq!(p.pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let empty: Paginated<i32> = Paginated::new(vec![], Page::new(None, 10), 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_next);
    }
}
