mod fcm_legacy;
mod fcm_v1;
mod log;

pub use fcm_legacy::FcmLegacyTransport;
pub use fcm_v1::FcmV1Transport;
pub use log::LogTransport;

use crate::config::{PlatformConfig, PushTransportConfig};
use crate::credentials::{Credentials, CredentialsError};
use crate::errors::ProviderError;
use crate::types::{DeviceToken, NotificationPayload};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("push transport credentials error: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("invalid push transport url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Everything in a message except the target token. Shared by every
/// per-token message of one dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageContent {
    pub title: String,
    pub body: String,
    pub data: IndexMap<String, String>,
    pub image_url: Option<String>,
    pub platform: PlatformConfig,
}

impl MessageContent {
    pub fn new(payload: NotificationPayload, platform: PlatformConfig) -> Self {
        MessageContent {
            title: payload.title,
            body: payload.body,
            data: payload.data,
            image_url: payload.image_url,
            platform,
        }
    }
}

/// A message addressed to exactly one device token.
#[derive(Clone, Debug)]
pub struct PushMessage {
    pub token: DeviceToken,
    pub content: Arc<MessageContent>,
}

/// A push provider accepting one message per call.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Sends the message, returning the provider's message id.
    async fn send(&self, message: &PushMessage) -> Result<String, ProviderError>;

    fn name(&self) -> &'static str;
}

pub fn get_transport(
    config: &PushTransportConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn PushTransport>, TransportError> {
    match config {
        PushTransportConfig::FcmV1 {
            project_id,
            base_url,
            credentials,
        } => {
            let credentials = Credentials::from_config(credentials)?;
            let project_id = credentials.project_id(project_id.as_deref())?;
            tracing::info!(%project_id, "using fcm v1 push transport");
            Ok(Arc::new(FcmV1Transport::new(
                client,
                base_url.clone(),
                project_id,
                credentials,
            )?))
        }
        PushTransportConfig::FcmLegacy { server_key, url } => {
            tracing::info!(%url, "using legacy fcm push transport");
            Ok(Arc::new(FcmLegacyTransport::new(
                client,
                url.clone(),
                server_key.clone(),
            )))
        }
        PushTransportConfig::Log => {
            tracing::warn!("using log push transport, notifications will not be delivered");
            Ok(Arc::new(LogTransport::new()))
        }
    }
}
