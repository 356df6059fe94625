use std::path::PathBuf;
use std::str::FromStr;

/// Application-level constants
pub const APP_NAME: &str = "OdontoClinic";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default listen address for the HTTP server.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";

/// PBKDF2-HMAC-SHA256 rounds for stored password hashes.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 260_000;

/// Base URL of the Invertexto holiday API.
pub const INVERTEXTO_BASE_URL: &str = "https://api.invertexto.com/v1/holidays";

/// Get the application data directory (`<data dir>/OdontoClinic`).
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory holding one SQLite file per bind.
pub fn instance_dir() -> PathBuf {
    app_data_dir().join("instance")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "odontoclinic=info,odontoclinic_lib=info,tower_http=info".to_string()
}

/// Local assistant settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    /// Backend names tried in order (`ollama`, `simple`).
    pub providers: Vec<String>,
    pub ollama_url: String,
    pub ollama_model: String,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            providers: vec!["ollama".into(), "simple".into()],
            ollama_url: "http://localhost:11434".into(),
            ollama_model: "llama3".into(),
            timeout_secs: 60,
        }
    }
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub instance_dir: PathBuf,
    pub bind_addr: String,
    pub require_login: bool,
    pub debug_login_bypass: bool,
    pub master_password: Option<String>,
    pub enforce_password_policy: bool,
    pub password_min_length: usize,
    pub max_failed_logins: u32,
    pub lockout_minutes: i64,
    pub session_timeout_min: i64,
    pub password_max_age_days: i64,
    pub pbkdf2_iterations: u32,
    pub invertexto_base_url: String,
    pub ai: AiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_dir: instance_dir(),
            bind_addr: DEFAULT_BIND_ADDR.into(),
            require_login: true,
            debug_login_bypass: false,
            master_password: None,
            enforce_password_policy: true,
            password_min_length: 8,
            max_failed_logins: 5,
            lockout_minutes: 15,
            session_timeout_min: 60,
            password_max_age_days: 180,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            invertexto_base_url: INVERTEXTO_BASE_URL.into(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    /// Build the configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let ai_defaults = AiConfig::default();

        Self {
            instance_dir: std::env::var("ODONTO_INSTANCE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.instance_dir),
            bind_addr: std::env::var("ODONTO_BIND").unwrap_or(defaults.bind_addr),
            require_login: env_flag("REQUIRE_LOGIN", defaults.require_login),
            debug_login_bypass: env_flag("DEBUG_LOGIN_BYPASS", defaults.debug_login_bypass),
            master_password: std::env::var("MASTER_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
            enforce_password_policy: env_flag(
                "ENFORCE_PASSWORD_POLICY",
                defaults.enforce_password_policy,
            ),
            password_min_length: env_parse("PASSWORD_MIN_LENGTH", defaults.password_min_length),
            max_failed_logins: env_parse("MAX_FAILED_LOGINS", defaults.max_failed_logins),
            lockout_minutes: env_parse("LOCKOUT_MINUTES", defaults.lockout_minutes),
            session_timeout_min: env_parse("SESSION_TIMEOUT_MIN", defaults.session_timeout_min),
            password_max_age_days: env_parse(
                "PASSWORD_MAX_AGE_DAYS",
                defaults.password_max_age_days,
            ),
            pbkdf2_iterations: env_parse("PBKDF2_ITERATIONS", defaults.pbkdf2_iterations),
            invertexto_base_url: std::env::var("INVERTEXTO_BASE_URL")
                .unwrap_or(defaults.invertexto_base_url),
            ai: AiConfig {
                enabled: env_flag("AI_ENABLED", ai_defaults.enabled),
                providers: std::env::var("AI_PROVIDERS")
                    .map(|v| split_list(&v))
                    .unwrap_or(ai_defaults.providers),
                ollama_url: std::env::var("OLLAMA_URL").unwrap_or(ai_defaults.ollama_url),
                ollama_model: std::env::var("OLLAMA_MODEL").unwrap_or(ai_defaults.ollama_model),
                timeout_secs: env_parse("AI_TIMEOUT_SECS", ai_defaults.timeout_secs),
            },
        }
    }

    /// True when requests without a session are served as a default user.
    pub fn login_bypassed(&self) -> bool {
        self.debug_login_bypass || !self.require_login
    }
}

/// Parse a boolean flag the way operators write them in `.env` files.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
