use super::{PushMessage, PushTransport};
use crate::errors::ProviderError;
use crate::types::redact_token;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Accepts every message and logs it. Useful for local development and
/// dry runs.
#[derive(Default)]
pub struct LogTransport {
    sent: AtomicU64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PushTransport for LogTransport {
    async fn send(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let seq = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = format!("dry-run/{seq}");

        tracing::info!(
            token = %redact_token(&message.token),
            title = %message.content.title,
            data_keys = message.content.data.len(),
            %message_id,
            "dry run notification"
        );

        Ok(message_id)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
