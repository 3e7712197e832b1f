//! Firebase Cloud Messaging HTTP v1 API.
//!
//! Each token is sent as its own `messages:send` request. Failures carry the
//! FCM error code (`UNREGISTERED`, `INVALID_ARGUMENT`, ...) when the response
//! includes one.

use super::{PushMessage, PushTransport};
use crate::config::as_base_url;
use crate::credentials::Credentials;
use crate::errors::ProviderError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    token: &'a str,
    notification: Notification<'a>,
    #[serde(skip_serializing_if = "is_empty")]
    data: &'a IndexMap<String, String>,
    android: AndroidConfig<'a>,
    apns: ApnsConfig<'a>,
}

#[derive(Serialize)]
struct Notification<'a> {
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Serialize)]
struct AndroidConfig<'a> {
    priority: &'a str,
    notification: AndroidNotification<'a>,
}

#[derive(Serialize)]
struct AndroidNotification<'a> {
    channel_id: &'a str,
    sound: &'a str,
    click_action: &'a str,
}

#[derive(Serialize)]
struct ApnsConfig<'a> {
    payload: ApnsPayload<'a>,
}

#[derive(Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
}

#[derive(Serialize)]
struct Aps<'a> {
    alert: ApsAlert<'a>,
    sound: &'a str,
    badge: u32,
}

#[derive(Serialize)]
struct ApsAlert<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    error_code: Option<String>,
}

fn is_empty(data: &&IndexMap<String, String>) -> bool {
    data.is_empty()
}

fn build_request(message: &PushMessage) -> SendRequest<'_> {
    let content = &message.content;
    let platform = &content.platform;

    SendRequest {
        message: Message {
            token: &message.token,
            notification: Notification {
                title: &content.title,
                body: &content.body,
                image: content.image_url.as_deref(),
            },
            data: &content.data,
            android: AndroidConfig {
                priority: &platform.android_priority,
                notification: AndroidNotification {
                    channel_id: &platform.android_channel_id,
                    sound: &platform.sound,
                    click_action: &platform.click_action,
                },
            },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        alert: ApsAlert {
                            title: &content.title,
                            body: &content.body,
                        },
                        sound: &platform.sound,
                        badge: platform.apns_badge,
                    },
                },
            },
        },
    }
}

fn parse_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { error }) => {
            let code = error
                .details
                .into_iter()
                .find_map(|detail| detail.error_code)
                .or(error.status);
            let message = if error.message.is_empty() {
                format!("fcm returned {status}")
            } else {
                error.message
            };
            ProviderError::rejected(code, message)
        }
        Err(_) => ProviderError::rejected(None, format!("fcm returned {status}: {body}")),
    }
}

pub struct FcmV1Transport {
    client: reqwest::Client,
    send_url: Url,
    credentials: Credentials,
}

impl FcmV1Transport {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        project_id: String,
        credentials: Credentials,
    ) -> Result<Self, url::ParseError> {
        Ok(FcmV1Transport {
            client,
            send_url: as_base_url(base_url).join(&format!("projects/{project_id}/messages:send"))?,
            credentials,
        })
    }
}

#[async_trait]
impl PushTransport for FcmV1Transport {
    async fn send(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let auth = self
            .credentials
            .headers()
            .await
            .map_err(|e| ProviderError::Credentials(e.to_string()))?;

        let response = self
            .client
            .post(self.send_url.clone())
            .headers(auth)
            .json(&build_request(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &body));
        }

        let body = response
            .json::<SendResponse>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(body.name)
    }

    fn name(&self) -> &'static str {
        "fcm_v1"
    }
}
