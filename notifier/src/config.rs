use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

const DEFAULT_TOKENS_PER_USER: usize = 10;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SERVICE_ACCOUNT_VAR: &str = "FIREBASE_SERVICE_ACCOUNT";
const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1/";
const FCM_V1_BASE_URL: &str = "https://fcm.googleapis.com/v1/";
const FCM_LEGACY_URL: &str = "https://fcm.googleapis.com/fcm/send";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("tokens_per_user must be greater than 0")]
    InvalidTokenLimit,

    #[error("http_timeout_secs must be greater than 0")]
    InvalidTimeout,

    #[error("fcm_legacy server_key is empty")]
    EmptyServerKey,

    #[error("static token store has a token for unknown user: {0}")]
    UnknownStaticUser(String),

    #[error("duplicate static user id: {0}")]
    DuplicateStaticUser(String),

    #[error("access token credentials are empty")]
    EmptyAccessToken,
}

/// Notification dispatch configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Upper bound on token records fetched per user
    #[serde(default = "default_tokens_per_user")]
    pub tokens_per_user: usize,
    /// Mark tokens the provider reports as unregistered inactive in the store
    #[serde(default = "default_true")]
    pub deactivate_stale_tokens: bool,
    /// Timeout applied to every outbound store and provider request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Fixed platform fields added to every outbound message
    #[serde(default)]
    pub platform: PlatformConfig,
    pub token_store: TokenStoreConfig,
    pub push_transport: PushTransportConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tokens_per_user == 0 {
            return Err(ValidationError::InvalidTokenLimit);
        }
        if self.http_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        match &self.token_store {
            TokenStoreConfig::Firestore { credentials, .. } => credentials.validate()?,
            TokenStoreConfig::Static { users, tokens } => {
                let mut ids = std::collections::HashSet::new();
                for user in users {
                    if !ids.insert(user.id.as_str()) {
                        return Err(ValidationError::DuplicateStaticUser(user.id.clone()));
                    }
                }
                for token in tokens {
                    if !ids.contains(token.user_id.as_str()) {
                        return Err(ValidationError::UnknownStaticUser(token.user_id.clone()));
                    }
                }
            }
        }

        match &self.push_transport {
            PushTransportConfig::FcmV1 { credentials, .. } => credentials.validate()?,
            PushTransportConfig::FcmLegacy { server_key, .. } => {
                if server_key.trim().is_empty() {
                    return Err(ValidationError::EmptyServerKey);
                }
            }
            PushTransportConfig::Log => {}
        }

        Ok(())
    }
}

/// Platform-specific message fields. These are operator settings, never
/// taken from a request.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    pub android_channel_id: String,
    pub android_priority: String,
    pub sound: String,
    pub click_action: String,
    pub apns_badge: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            android_channel_id: "muscleup_notifications".into(),
            android_priority: "high".into(),
            sound: "default".into(),
            click_action: "FLUTTER_NOTIFICATION_CLICK".into(),
            apns_badge: 1,
        }
    }
}

/// Where Google OAuth credentials come from
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsConfig {
    /// Service account key JSON on disk
    ServiceAccountFile { path: PathBuf },
    /// Service account key JSON held in an environment variable
    ServiceAccountEnv {
        #[serde(default = "default_service_account_var")]
        var: String,
    },
    /// A pre-minted OAuth access token, used as is
    AccessToken { token: String },
}

impl CredentialsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            CredentialsConfig::AccessToken { token } if token.trim().is_empty() => {
                Err(ValidationError::EmptyAccessToken)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenStoreConfig {
    Firestore {
        /// Defaults to the project of the service account
        project_id: Option<String>,
        #[serde(default = "default_firestore_url")]
        base_url: Url,
        credentials: CredentialsConfig,
    },
    /// Users and tokens listed inline, for local development
    Static {
        #[serde(default)]
        users: Vec<StaticUser>,
        #[serde(default)]
        tokens: Vec<StaticToken>,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StaticUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    pub legacy_token: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StaticToken {
    pub user_id: String,
    pub token: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushTransportConfig {
    /// FCM HTTP v1 API with OAuth credentials
    FcmV1 {
        /// Defaults to the project of the service account
        project_id: Option<String>,
        #[serde(default = "default_fcm_v1_url")]
        base_url: Url,
        credentials: CredentialsConfig,
    },
    /// Legacy FCM HTTP API authorized with a server key
    FcmLegacy {
        server_key: String,
        #[serde(default = "default_fcm_legacy_url")]
        url: Url,
    },
    /// Logs messages instead of sending them
    Log,
}

fn default_tokens_per_user() -> usize {
    DEFAULT_TOKENS_PER_USER
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

fn default_service_account_var() -> String {
    DEFAULT_SERVICE_ACCOUNT_VAR.into()
}

fn default_firestore_url() -> Url {
    Url::parse(FIRESTORE_BASE_URL).expect("default URL is valid")
}

fn default_fcm_v1_url() -> Url {
    Url::parse(FCM_V1_BASE_URL).expect("default URL is valid")
}

fn default_fcm_legacy_url() -> Url {
    Url::parse(FCM_LEGACY_URL).expect("default URL is valid")
}

/// Gives `url` a trailing slash so joining relative paths keeps its last
/// path segment.
pub fn as_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
