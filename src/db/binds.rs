//! Multi-bind layout: one SQLite file per domain area.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::sqlite::open_database;
use super::DatabaseError;

/// A named database file for one domain area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bind {
    Calendario,
    Pacientes,
    Users,
    Tratamentos,
    Receitas,
}

impl Bind {
    pub const ALL: [Bind; 5] = [
        Bind::Calendario,
        Bind::Pacientes,
        Bind::Users,
        Bind::Tratamentos,
        Bind::Receitas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bind::Calendario => "calendario",
            Bind::Pacientes => "pacientes",
            Bind::Users => "users",
            Bind::Tratamentos => "tratamentos",
            Bind::Receitas => "receitas",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Bind::Calendario => "calendario.db",
            Bind::Pacientes => "pacientes.db",
            Bind::Users => "users.db",
            Bind::Tratamentos => "tratamentos.db",
            Bind::Receitas => "receitas.db",
        }
    }

    /// Ordered migrations for this bind.
    pub(crate) fn migrations(&self) -> &'static [(i64, &'static str)] {
        match self {
            Bind::Calendario => &[
                (1, include_str!("../../resources/migrations/calendario/001_initial.sql")),
            ],
            Bind::Pacientes => &[
                (1, include_str!("../../resources/migrations/pacientes/001_initial.sql")),
                (2, include_str!("../../resources/migrations/pacientes/002_budget_triggers.sql")),
            ],
            Bind::Users => &[
                (1, include_str!("../../resources/migrations/users/001_initial.sql")),
            ],
            Bind::Tratamentos => &[
                (1, include_str!("../../resources/migrations/tratamentos/001_initial.sql")),
            ],
            Bind::Receitas => &[
                (1, include_str!("../../resources/migrations/receitas/001_initial.sql")),
            ],
        }
    }
}

/// Resolves bind names to files under the instance directory.
#[derive(Debug, Clone)]
pub struct Binds {
    dir: PathBuf,
}

impl Binds {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, bind: Bind) -> PathBuf {
        self.dir.join(bind.file_name())
    }

    /// Open a configured connection to the bind's file.
    pub fn open(&self, bind: Bind) -> Result<Connection, DatabaseError> {
        open_database(&self.path(bind), bind)
    }

    /// Create every bind file and bring its schema up to date.
    pub fn initialize_all(&self) -> Result<(), DatabaseError> {
        std::fs::create_dir_all(&self.dir)?;
        for bind in Bind::ALL {
            self.open(bind)?;
            tracing::info!(bind = bind.as_str(), "Database bind ready");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bind_has_its_own_file() {
        let binds = Binds::new("/tmp/instance");
        let mut files: Vec<_> = Bind::ALL.iter().map(|b| binds.path(*b)).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), Bind::ALL.len());
        assert!(binds.path(Bind::Users).ends_with("users.db"));
    }

    #[test]
    fn initialize_all_creates_files() {
        let tmp = tempfile::tempdir().unwrap();
        let binds = Binds::new(tmp.path().join("instance"));
        binds.initialize_all().unwrap();
        for bind in Bind::ALL {
            assert!(binds.path(bind).exists(), "{} missing", bind.file_name());
        }
    }

    #[test]
    fn migrations_are_ordered() {
        for bind in Bind::ALL {
            let versions: Vec<i64> = bind.migrations().iter().map(|(v, _)| *v).collect();
            let mut sorted = versions.clone();
            sorted.sort();
            assert_eq!(versions, sorted);
        }
    }
}
