use http::HeaderValue;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_AI_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RELAY_TIMEOUT_SECS: u64 = 30;
const AI_BACKEND_URL: &str = "https://dalle.roamjet.net";
const EMAIL_RELAY_URL: &str = "https://smtp.roamjet.net/api/email/send";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("max_body_bytes must be greater than 0")]
    InvalidBodyLimit,

    #[error("Invalid CORS allow_origin: {0}")]
    InvalidAllowOrigin(String),

    #[error("{0} timeout must be greater than 0")]
    InvalidTimeout(&'static str),

    #[error("email_relay {0} is empty")]
    EmptyRelayField(&'static str),
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for API requests
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Requests with larger bodies are rejected
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Backend the AI chat and image routes forward to
    #[serde(default)]
    pub ai_backend: AiBackendConfig,
    /// Relay used by the booster email route. The route answers 503 when unset.
    pub email_relay: Option<EmailRelayConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }
        self.cors.allow_origin_header()?;

        if self.ai_backend.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("ai_backend"));
        }

        if let Some(relay) = &self.email_relay {
            if relay.timeout_secs == 0 {
                return Err(ValidationError::InvalidTimeout("email_relay"));
            }
            if relay.project_id.trim().is_empty() {
                return Err(ValidationError::EmptyRelayField("project_id"));
            }
            if relay.template_id.trim().is_empty() {
                return Err(ValidationError::EmptyRelayField("template_id"));
            }
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allow_origin: "*".into(),
        }
    }
}

impl CorsConfig {
    pub fn allow_origin_header(&self) -> Result<HeaderValue, ValidationError> {
        HeaderValue::from_str(&self.allow_origin)
            .map_err(|_| ValidationError::InvalidAllowOrigin(self.allow_origin.clone()))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AiBackendConfig {
    #[serde(default = "default_ai_backend_url")]
    pub url: Url,
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiBackendConfig {
    fn default() -> Self {
        AiBackendConfig {
            url: default_ai_backend_url(),
            timeout_secs: DEFAULT_AI_TIMEOUT_SECS,
        }
    }
}

impl AiBackendConfig {
    /// The backend URL with `/{name}` appended to its path.
    pub fn endpoint(&self, name: &str) -> Result<Url, url::ParseError> {
        let base = self.url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{name}"))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EmailRelayConfig {
    #[serde(default = "default_email_relay_url")]
    pub url: Url,
    pub project_id: String,
    pub template_id: String,
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_ai_timeout_secs() -> u64 {
    DEFAULT_AI_TIMEOUT_SECS
}

fn default_relay_timeout_secs() -> u64 {
    DEFAULT_RELAY_TIMEOUT_SECS
}

fn default_ai_backend_url() -> Url {
    Url::parse(AI_BACKEND_URL).expect("default URL is valid")
}

fn default_email_relay_url() -> Url {
    Url::parse(EMAIL_RELAY_URL).expect("default URL is valid")
}
