use thiserror::Error;

use crate::config::ValidationError;
use crate::store::StoreError;
use crate::transport::TransportError;
use crate::types::DeliveryReport;

/// Error codes push providers use for tokens that are no longer registered.
const STALE_TOKEN_CODES: &[&str] = &[
    // FCM HTTP v1
    "UNREGISTERED",
    // legacy FCM HTTP API
    "NotRegistered",
    "InvalidRegistration",
    // Admin SDK error codes
    "messaging/registration-token-not-registered",
    "messaging/invalid-registration-token",
];

/// Errors surfaced by a dispatch call.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Missing payload fields or no resolvable recipients.
    #[error("{0}")]
    Validation(String),

    /// A named user has no account.
    #[error("{0}")]
    NotFound(String),

    /// Every token was attempted and none accepted the notification.
    #[error("failed to deliver notification to any of {} token(s)", .0.total_tokens)]
    AllFailed(DeliveryReport),
}

/// Errors building a dispatcher from configuration.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("invalid notifier config: {0}")]
    Config(#[from] ValidationError),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Per-token failure reported by a push transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered and refused the message.
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },

    #[error("push request failed: {0}")]
    Transport(String),

    #[error("could not authorize push request: {0}")]
    Credentials(String),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn rejected(code: Option<String>, message: impl Into<String>) -> Self {
        ProviderError::Rejected {
            code,
            message: message.into(),
        }
    }

    /// True when the provider says the token itself is invalid or unregistered.
    pub fn is_stale_token(&self) -> bool {
        match self {
            ProviderError::Rejected {
                code: Some(code), ..
            } => STALE_TOKEN_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transport(e.to_string())
    }
}
