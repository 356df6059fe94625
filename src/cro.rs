//! Offline dental-council (CRO) registration lookup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CroError {
    #[error("Informe termo de busca")]
    MissingTerm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CroRecord {
    pub nome: &'static str,
    pub registro: &'static str,
    pub uf: &'static str,
}

const REGISTRY: &[CroRecord] = &[
    CroRecord {
        nome: "Dr. João Silva",
        registro: "12345",
        uf: "SP",
    },
    CroRecord {
        nome: "Dra. Ana Souza",
        registro: "67890",
        uf: "RJ",
    },
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CroQuery {
    #[serde(default)]
    pub search_term: String,
    pub uf: Option<String>,
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Lowercase and strip Latin diacritics.
pub fn fold(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).map(fold_char).collect()
}

pub fn search(query: &CroQuery) -> Result<Vec<CroRecord>, CroError> {
    let term = query.search_term.trim();
    if term.is_empty() {
        return Err(CroError::MissingTerm);
    }
    let term = fold(term);
    let uf = query.uf.as_deref().map(str::trim).unwrap_or("todos");
    Ok(REGISTRY
        .iter()
        .filter(|r| fold(r.nome).contains(&term))
        .filter(|r| uf.eq_ignore_ascii_case("todos") || r.uf.eq_ignore_ascii_case(uf))
        .cloned()
        .collect())
}
