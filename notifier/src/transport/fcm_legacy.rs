use super::{PushMessage, PushTransport};
use crate::errors::ProviderError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Legacy FCM HTTP API authorized with a server key.
pub struct FcmLegacyTransport {
    client: reqwest::Client,
    url: Url,
    server_key: String,
}

#[derive(Serialize)]
struct LegacyRequest<'a> {
    to: &'a str,
    priority: &'a str,
    notification: LegacyNotification<'a>,
    #[serde(skip_serializing_if = "is_empty")]
    data: &'a IndexMap<String, String>,
}

#[derive(Serialize)]
struct LegacyNotification<'a> {
    title: &'a str,
    body: &'a str,
    sound: &'a str,
    click_action: &'a str,
    android_channel_id: &'a str,
    badge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Deserialize)]
struct LegacyResponse {
    #[serde(default)]
    results: Vec<LegacyResult>,
}

#[derive(Deserialize)]
struct LegacyResult {
    message_id: Option<String>,
    error: Option<String>,
}

fn is_empty(data: &&IndexMap<String, String>) -> bool {
    data.is_empty()
}

impl FcmLegacyTransport {
    pub fn new(client: reqwest::Client, url: Url, server_key: String) -> Self {
        FcmLegacyTransport {
            client,
            url,
            server_key,
        }
    }
}

#[async_trait]
impl PushTransport for FcmLegacyTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let content = &message.content;
        let request = LegacyRequest {
            to: &message.token,
            priority: &content.platform.android_priority,
            notification: LegacyNotification {
                title: &content.title,
                body: &content.body,
                sound: &content.platform.sound,
                click_action: &content.platform.click_action,
                android_channel_id: &content.platform.android_channel_id,
                badge: content.platform.apns_badge.to_string(),
                image: content.image_url.as_deref(),
            },
            data: &content.data,
        };

        let response = self
            .client
            .post(self.url.clone())
            .header("authorization", format!("key={}", self.server_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::rejected(
                None,
                format!("fcm returned {}: {}", status.as_u16(), body.trim()),
            ));
        }

        let body = response
            .json::<LegacyResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        match body.results.into_iter().next() {
            Some(LegacyResult {
                message_id: Some(id),
                ..
            }) => Ok(id),
            Some(LegacyResult {
                error: Some(code), ..
            }) => Err(ProviderError::rejected(Some(code.clone()), code)),
            _ => Err(ProviderError::InvalidResponse(
                "response has no message id or error".into(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "fcm_legacy"
    }
}
