//! Chat assistant with ordered backend fallback.
//!
//! Backends are tried in the configured order; the first one that answers
//! wins. `simple` never fails, so listing it last guarantees a reply.

use serde::{Deserialize, Serialize};

use crate::config::AiConfig;

const SYSTEM_PROMPT: &str = "Você é o assistente de um consultório odontológico. \
Responda em português, de forma breve e objetiva. \
Não faça diagnósticos; oriente a procurar o dentista responsável.";

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Assistente desativado")]
    Disabled,

    #[error("Mensagem vazia")]
    EmptyMessage,

    #[error("Nenhum provedor disponível")]
    NoBackend,

    #[error("Cannot connect to Ollama at {0}")]
    Connection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Ollama returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Response parsing failed: {0}")]
    ResponseParsing(String),
}

/// One way of answering a chat message.
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn reply(&self, message: &str) -> Result<String, AssistantError>;
}

/// Local Ollama instance (`/api/generate`, non-streaming).
///
/// The blocking HTTP client is created per call, so replies must be
/// requested off the async runtime.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout_secs,
        }
    }

    fn client(&self) -> Result<reqwest::blocking::Client, AssistantError> {
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AssistantError::HttpClient(e.to_string()))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl ChatBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn reply(&self, message: &str) -> Result<String, AssistantError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: message,
            system: SYSTEM_PROMPT,
            stream: false,
        };
        let response = self.client()?.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                AssistantError::Connection(self.base_url.clone())
            } else if e.is_timeout() {
                AssistantError::HttpClient(format!(
                    "Request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                AssistantError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AssistantError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| AssistantError::ResponseParsing(e.to_string()))?;
        Ok(parsed.response.trim().to_string())
    }
}

/// Deterministic offline reply.
pub struct SimpleBackend;

impl ChatBackend for SimpleBackend {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn reply(&self, message: &str) -> Result<String, AssistantError> {
        let lower = message.to_lowercase();
        let hint = if lower.contains("agenda") || lower.contains("consulta") {
            "Para marcar ou mover consultas, use a Agenda."
        } else if lower.contains("receita") || lower.contains("medicamento") {
            "Modelos de receita e a base de medicamentos ficam em Receitas."
        } else if lower.contains("anest") {
            "A calculadora de anestésicos informa o número máximo de tubetes."
        } else {
            "Posso ajudar com agenda, pacientes, receitas e documentos."
        };
        Ok(format!("Assistente offline. {hint}"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantStatus {
    pub enabled: bool,
    pub providers: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub provider: &'static str,
    pub reply: String,
}

pub struct Assistant {
    enabled: bool,
    backends: Vec<Box<dyn ChatBackend>>,
}

impl Assistant {
    pub fn new(enabled: bool, backends: Vec<Box<dyn ChatBackend>>) -> Self {
        Self { enabled, backends }
    }

    /// Build the backend chain; unknown provider names are skipped.
    pub fn from_config(config: &AiConfig) -> Self {
        let mut backends: Vec<Box<dyn ChatBackend>> = Vec::new();
        for provider in &config.providers {
            match provider.trim().to_lowercase().as_str() {
                "ollama" => backends.push(Box::new(OllamaBackend::new(
                    &config.ollama_url,
                    &config.ollama_model,
                    config.timeout_secs,
                ))),
                "simple" => backends.push(Box::new(SimpleBackend)),
                other => tracing::warn!(provider = other, "Unknown assistant provider ignored"),
            }
        }
        Self::new(config.enabled, backends)
    }

    pub fn status(&self) -> AssistantStatus {
        AssistantStatus {
            enabled: self.enabled,
            providers: self.backends.iter().map(|b| b.name()).collect(),
        }
    }

    /// Ask each backend in turn. Returns the last failure when none answers.
    pub fn chat(&self, message: &str) -> Result<ChatReply, AssistantError> {
        if !self.enabled {
            return Err(AssistantError::Disabled);
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        let mut last_error = AssistantError::NoBackend;
        for backend in &self.backends {
            match backend.reply(message) {
                Ok(reply) => {
                    return Ok(ChatReply {
                        provider: backend.name(),
                        reply,
                    })
                }
                Err(e) => {
                    tracing::warn!(provider = backend.name(), error = %e, "Assistant backend failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
