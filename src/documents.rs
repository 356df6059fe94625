//! Configurable clinical documents: type definitions, field capture,
//! template rendering and HTML/PDF output.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{now, Clinica, DocumentFields, Documento, Paciente, SignatureKind, User};
use crate::pdf::{attachment_name, PdfError, PdfWriter};

/// Definitions compiled into the binary.
const EMBEDDED_TYPES: &str = include_str!("../resources/document_types.json");

/// Optional override file in the instance directory.
pub const TYPES_FILE: &str = "tipos_documentos.json";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Tipo não encontrado")]
    UnknownType,

    #[error("Campo '{0}' obrigatório")]
    RequiredField(String),

    #[error("Título obrigatório")]
    MissingTitle,

    #[error("Invalid document types file: {0}")]
    Config(String),

    #[error(transparent)]
    Pdf(#[from] PdfError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campo {
    pub nome: String,
    pub label: String,
    #[serde(default = "default_field_kind")]
    pub tipo: String,
    #[serde(default)]
    pub obrigatorio: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opcoes: Vec<String>,
}

fn default_field_kind() -> String {
    "text".into()
}

impl Campo {
    pub fn is_checkbox(&self) -> bool {
        self.tipo == "checkbox"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentType {
    pub titulo: String,
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub campos: Vec<Campo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTypes {
    #[serde(default)]
    pub tipos_documentos: BTreeMap<String, DocumentType>,
}

impl DocumentTypes {
    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(raw).map_err(|e| DocumentError::Config(e.to_string()))
    }

    pub fn embedded() -> Result<Self, DocumentError> {
        Self::parse(EMBEDDED_TYPES)
    }

    /// Read `<instance_dir>/tipos_documentos.json` when present, else the
    /// embedded definitions. A broken override is logged and ignored.
    pub fn load(instance_dir: &Path) -> Result<Self, DocumentError> {
        let path = instance_dir.join(TYPES_FILE);
        if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(|e| DocumentError::Config(e.to_string()))
                .and_then(|raw| Self::parse(&raw))
            {
                Ok(types) => {
                    tracing::info!(path = %path.display(), count = types.tipos_documentos.len(), "Document types loaded");
                    return Ok(types);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring document types override");
                }
            }
        }
        Self::embedded()
    }

    pub fn get(&self, tipo: &str) -> Option<&DocumentType> {
        self.tipos_documentos.get(tipo)
    }
}

fn text_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn id_value(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Collect the configured fields from a request body. Checkbox fields are
/// stored as lists; everything else as trimmed text.
pub fn collect_fields(
    tipo: &DocumentType,
    body: &Map<String, Value>,
) -> Result<DocumentFields, DocumentError> {
    let mut dados = DocumentFields::new();
    for campo in &tipo.campos {
        let raw = body.get(&campo.nome);
        let (value, empty) = if campo.is_checkbox() {
            let items: Vec<Value> = match raw {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(text_value)
                    .filter(|s| !s.is_empty())
                    .map(Value::String)
                    .collect(),
                Some(v) => Some(text_value(v))
                    .filter(|s| !s.is_empty())
                    .map(Value::String)
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            };
            let empty = items.is_empty();
            (Value::Array(items), empty)
        } else {
            let text = raw.map(text_value).unwrap_or_default();
            let empty = text.is_empty();
            (Value::String(text), empty)
        };
        if campo.obrigatorio && empty {
            return Err(DocumentError::RequiredField(campo.label.clone()));
        }
        dados.insert(campo.nome.clone(), value);
    }
    Ok(dados)
}

/// Build a generated document of type `tipo` from a request body.
pub fn generate(
    tipo: &str,
    types: &DocumentTypes,
    body: &Map<String, Value>,
    clinica: &Clinica,
) -> Result<Documento, DocumentError> {
    let cfg = types.get(tipo).ok_or(DocumentError::UnknownType)?;
    let mut dados = collect_fields(cfg, body)?;

    let assinatura = body
        .get("assinatura_tipo")
        .map(text_value)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| SignatureKind::Dentista.as_str().to_string());
    let paciente_id = id_value(body.get("paciente_id"));
    let dentista_id = id_value(body.get("dentista_id"))
        .filter(|_| assinatura == SignatureKind::Dentista.as_str());
    if let Some(id) = paciente_id {
        dados.insert("paciente_id".into(), Value::from(id));
    }
    if let Some(id) = dentista_id {
        dados.insert("dentista_id".into(), Value::from(id));
    }
    dados.insert("assinatura_tipo".into(), Value::String(assinatura));

    let local_emissao = body
        .get("local_emissao")
        .map(text_value)
        .filter(|s| !s.is_empty())
        .or_else(|| clinica.local_padrao());
    let observacoes = body
        .get("observacoes")
        .map(text_value)
        .filter(|s| !s.is_empty());

    Ok(Documento {
        id: 0,
        paciente_id,
        dentista_id,
        tipo_documento: tipo.to_string(),
        titulo_documento: cfg.titulo.clone(),
        conteudo: dados,
        data_emissao: now(),
        local_emissao,
        observacoes,
    })
}

/// Free-form document without configured fields.
pub fn simple(
    titulo: &str,
    tipo: Option<&str>,
    observacoes: Option<&str>,
) -> Result<Documento, DocumentError> {
    let titulo = titulo.trim();
    if titulo.is_empty() {
        return Err(DocumentError::MissingTitle);
    }
    let tipo = tipo.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("generico");
    Ok(Documento {
        id: 0,
        paciente_id: None,
        dentista_id: None,
        tipo_documento: tipo.to_string(),
        titulo_documento: titulo.to_string(),
        conteudo: DocumentFields::new(),
        data_emissao: now(),
        local_emissao: None,
        observacoes: observacoes.map(str::trim).filter(|o| !o.is_empty()).map(String::from),
    })
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_html(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#34;", "\"")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap());
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Replace `{{ name }}` placeholders; unknown names render empty.
pub fn render_template(template: &str, ctx: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            ctx.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// HTML fragment to plain text lines for the PDF body.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = LINE_BREAK.replace_all(html, "\n");
    unescape_html(&TAG.replace_all(&with_breaks, ""))
}

/// Who signs a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signer {
    pub nome: String,
    /// `CRO: …` or `CNPJ: …`.
    pub registro: Option<String>,
}

/// Everything the HTML and PDF outputs need, with the body already rendered.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedDocument {
    pub id: i64,
    pub titulo: String,
    pub clinica_header: Vec<String>,
    /// HTML body with every substituted value escaped.
    pub corpo_html: String,
    pub local_data: Option<String>,
    pub assinatura: Signer,
    pub observacoes: Option<String>,
    pub filename: String,
}

fn signs_as_dentist(doc: &Documento) -> bool {
    doc.conteudo
        .get("assinatura_tipo")
        .and_then(Value::as_str)
        .map_or(true, |s| s == SignatureKind::Dentista.as_str())
}

fn signer_name(dentista: &User) -> String {
    dentista
        .nome_completo
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| dentista.display_name().to_string())
}

/// Template context: patient, signer and every stored field, HTML-escaped.
pub fn render_context(
    doc: &Documento,
    paciente: Option<&Paciente>,
    dentista: Option<&User>,
    clinica: &Clinica,
) -> BTreeMap<String, String> {
    let mut ctx = BTreeMap::new();
    ctx.insert(
        "nome_paciente".to_string(),
        paciente.map(|p| p.dados.nome.clone()).unwrap_or_default(),
    );
    ctx.insert(
        "cpf_paciente".to_string(),
        paciente
            .and_then(|p| p.dados.cpf.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "Não informado".into()),
    );
    match dentista.filter(|_| signs_as_dentist(doc)) {
        Some(d) => {
            ctx.insert("nome_dentista".into(), signer_name(d));
            ctx.insert(
                "cro_dentista".into(),
                d.cro.clone().unwrap_or_else(|| "Não informado".into()),
            );
        }
        None => {
            ctx.insert("nome_dentista".into(), clinic_name(clinica));
            ctx.insert(
                "cro_dentista".into(),
                clinica
                    .cnpj
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .map(|c| format!("CNPJ: {c}"))
                    .unwrap_or_default(),
            );
        }
    }
    for (key, value) in &doc.conteudo {
        let text = match value {
            Value::Array(items) => items
                .iter()
                .map(text_value)
                .collect::<Vec<_>>()
                .join(", "),
            other => text_value(other),
        };
        ctx.insert(key.clone(), text);
    }
    ctx.into_iter()
        .map(|(k, v)| (k, escape_html(&v)))
        .collect()
}

fn clinic_name(clinica: &Clinica) -> String {
    if clinica.nome.is_empty() {
        "Clínica".into()
    } else {
        clinica.nome.clone()
    }
}

pub(crate) fn clinic_header(clinica: &Clinica) -> Vec<String> {
    let mut header = Vec::new();
    if !clinica.nome.is_empty() {
        header.push(clinica.nome.clone());
    }
    if let Some(e) = clinica.endereco.as_deref().filter(|e| !e.is_empty()) {
        header.push(e.to_string());
    }
    if let Some(t) = clinica.telefone.as_deref().filter(|t| !t.is_empty()) {
        header.push(format!("Tel: {t}"));
    }
    header
}

pub fn render(
    doc: &Documento,
    cfg: &DocumentType,
    paciente: Option<&Paciente>,
    dentista: Option<&User>,
    clinica: &Clinica,
) -> RenderedDocument {
    let ctx = render_context(doc, paciente, dentista, clinica);
    let assinatura = match dentista.filter(|_| signs_as_dentist(doc)) {
        Some(d) => Signer {
            nome: signer_name(d),
            registro: d.cro.as_deref().filter(|c| !c.is_empty()).map(|c| format!("CRO: {c}")),
        },
        None => Signer {
            nome: clinic_name(clinica),
            registro: clinica
                .cnpj
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| format!("CNPJ: {c}")),
        },
    };
    let local_data = doc
        .local_emissao
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(|l| format!("{l}, {}", doc.data_emissao.format("%d/%m/%Y")));
    let stem = format!(
        "{}_{}",
        doc.titulo_documento,
        paciente.map(|p| p.dados.nome.as_str()).unwrap_or("doc")
    );
    RenderedDocument {
        id: doc.id,
        titulo: cfg.titulo.clone(),
        clinica_header: clinic_header(clinica),
        corpo_html: render_template(&cfg.template, &ctx),
        local_data,
        assinatura,
        observacoes: doc.observacoes.clone().filter(|o| !o.is_empty()),
        filename: attachment_name(&stem),
    }
}

impl RenderedDocument {
    pub fn to_html(&self) -> String {
        let mut html = String::from("<!DOCTYPE html>\n<html lang=\"pt-BR\"><head><meta charset=\"utf-8\">");
        html.push_str(&format!("<title>{}</title></head><body>\n", escape_html(&self.titulo)));
        if !self.clinica_header.is_empty() {
            let header: Vec<String> = self.clinica_header.iter().map(|h| escape_html(h)).collect();
            html.push_str(&format!("<header>{}</header>\n", header.join("<br>")));
        }
        html.push_str(&format!("<h1>{}</h1>\n", escape_html(&self.titulo)));
        html.push_str(&format!("<section class=\"conteudo\">{}</section>\n", self.corpo_html));
        if let Some(local_data) = &self.local_data {
            html.push_str(&format!("<p class=\"local-data\">{}</p>\n", escape_html(local_data)));
        }
        html.push_str("<div class=\"assinatura\"><p>__________________________________________________</p>");
        html.push_str(&format!("<p>{}</p>", escape_html(&self.assinatura.nome)));
        if let Some(registro) = &self.assinatura.registro {
            html.push_str(&format!("<p>{}</p>", escape_html(registro)));
        }
        html.push_str("</div>\n");
        if let Some(obs) = &self.observacoes {
            html.push_str(&format!(
                "<div class=\"observacoes\"><strong>Observações:</strong><p>{}</p></div>\n",
                escape_html(obs)
            ));
        }
        html.push_str("</body></html>\n");
        html
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, PdfError> {
        let mut w = PdfWriter::new(&self.titulo)?;
        for (i, line) in self.clinica_header.iter().enumerate() {
            if i == 0 {
                w.heading(line, 12.0);
            } else {
                w.line(line, 10.0);
            }
        }
        if !self.clinica_header.is_empty() {
            w.space(6.0);
        }
        w.centered(&self.titulo, 16.0, true);
        w.space(6.0);
        w.paragraph(&html_to_text(&self.corpo_html), 11.0, 90);
        w.space(10.0);
        if let Some(local_data) = &self.local_data {
            w.line(local_data, 11.0);
            w.space(10.0);
        }
        w.line(&"_".repeat(50), 11.0);
        w.line(&self.assinatura.nome, 11.0);
        if let Some(registro) = &self.assinatura.registro {
            w.line(registro, 11.0);
        }
        if let Some(obs) = &self.observacoes {
            w.space(8.0);
            w.heading("Observações:", 11.0);
            w.paragraph(obs, 11.0, 90);
        }
        w.finish()
    }
}

/// `api/<id>` summary.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub tipo: String,
    pub titulo: String,
    pub data: String,
}

impl From<&Documento> for DocumentSummary {
    fn from(doc: &Documento) -> Self {
        Self {
            id: doc.id,
            tipo: doc.tipo_documento.clone(),
            titulo: doc.titulo_documento.clone(),
            data: doc.data_emissao.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        }
    }
}
