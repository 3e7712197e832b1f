//! Google credentials shared by the Firestore store and the FCM v1 transport.
//!
//! Service account keys go through `google-cloud-auth`, which mints and caches
//! the access tokens. A pre-minted access token is used as is.

use crate::config::CredentialsConfig;
use google_cloud_auth::credentials::service_account::{AccessSpecifier, Builder};
use google_cloud_auth::credentials::{CacheableResource, Credentials as GoogleCredentials};
use http::header::AUTHORIZATION;
use http::{Extensions, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Arc;

const TOKEN_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/firebase.messaging",
];

#[derive(thiserror::Error, Debug)]
pub enum CredentialsError {
    #[error("could not read service account file: {0}")]
    Io(#[from] std::io::Error),
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
    #[error("could not parse service account key: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid service account key: {0}")]
    InvalidKey(String),
    #[error("could not obtain access token: {0}")]
    Token(String),
    #[error("access token is not a valid header value")]
    InvalidAccessToken,
    #[error("no project id configured and none found in the service account key")]
    MissingProjectId,
}

enum CredentialsInner {
    AccessToken(String),
    ServiceAccount {
        credentials: GoogleCredentials,
        project_id: Option<String>,
    },
}

/// Cheaply cloneable handle producing authorization headers for Google APIs.
#[derive(Clone)]
pub struct Credentials(Arc<CredentialsInner>);

impl Credentials {
    pub fn from_config(config: &CredentialsConfig) -> Result<Self, CredentialsError> {
        match config {
            CredentialsConfig::AccessToken { token } => Ok(Self::from_access_token(token.clone())),
            CredentialsConfig::ServiceAccountFile { path } => {
                let json = std::fs::read_to_string(path)?;
                Self::from_service_account_json(&json)
            }
            CredentialsConfig::ServiceAccountEnv { var } => {
                let json =
                    std::env::var(var).map_err(|_| CredentialsError::MissingEnv(var.clone()))?;
                Self::from_service_account_json(&json)
            }
        }
    }

    pub fn from_access_token(token: String) -> Self {
        Credentials(Arc::new(CredentialsInner::AccessToken(token)))
    }

    pub fn from_service_account_json(json: &str) -> Result<Self, CredentialsError> {
        let mut key: Value = serde_json::from_str(json)?;

        // Keys pasted into environment variables often carry escaped newlines.
        if let Some(private_key) = key.get("private_key").and_then(Value::as_str) {
            let private_key = private_key.replace("\\n", "\n");
            key["private_key"] = Value::String(private_key);
        }
        let project_id = key
            .get("project_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let client_email = key
            .get("client_email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let credentials = Builder::new(key)
            .with_access_specifier(AccessSpecifier::from_scopes(TOKEN_SCOPES))
            .build()
            .map_err(|e| CredentialsError::InvalidKey(e.to_string()))?;

        tracing::info!(%client_email, "loaded service account credentials");

        Ok(Credentials(Arc::new(CredentialsInner::ServiceAccount {
            credentials,
            project_id,
        })))
    }

    /// Picks the configured project id, falling back to the service account's.
    pub fn project_id(&self, configured: Option<&str>) -> Result<String, CredentialsError> {
        if let Some(project_id) = configured {
            return Ok(project_id.to_string());
        }
        match self.0.as_ref() {
            CredentialsInner::ServiceAccount { project_id, .. } => {
                project_id.clone().ok_or(CredentialsError::MissingProjectId)
            }
            CredentialsInner::AccessToken(_) => Err(CredentialsError::MissingProjectId),
        }
    }

    /// Headers authorizing a request, `authorization` among them.
    pub async fn headers(&self) -> Result<HeaderMap, CredentialsError> {
        match self.0.as_ref() {
            CredentialsInner::AccessToken(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| CredentialsError::InvalidAccessToken)?;
                let mut headers = HeaderMap::new();
                headers.insert(AUTHORIZATION, value);
                Ok(headers)
            }
            CredentialsInner::ServiceAccount { credentials, .. } => {
                match credentials
                    .headers(Extensions::new())
                    .await
                    .map_err(|e| CredentialsError::Token(e.to_string()))?
                {
                    CacheableResource::New { data, .. } => Ok(data),
                    CacheableResource::NotModified => Err(CredentialsError::Token(
                        "credentials returned no headers".into(),
                    )),
                }
            }
        }
    }
}
