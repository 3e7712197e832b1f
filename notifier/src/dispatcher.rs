//! Fan-out of one notification to every device token of a recipient.
//!
//! A dispatch validates the payload, resolves the recipient into tokens and
//! sends one message per token, each in its own task. All tasks are joined
//! before the report is built, so a slow or failing token never hides the
//! outcome of the others.

use crate::config::{Config, PlatformConfig};
use crate::errors::{DispatchError, NotifierError};
use crate::metrics_defs::{DISPATCH_DELIVERIES, DISPATCH_DURATION, DISPATCH_STALE_TOKENS};
use crate::resolver::TokenResolver;
use crate::store::{TokenStore, get_store};
use crate::transport::{MessageContent, PushMessage, PushTransport, get_transport};
use crate::types::{DeliveryReport, DeliveryResult, DeviceToken, NotificationPayload, RecipientSpec};
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Tunables for a [`Dispatcher`].
#[derive(Clone, Debug)]
pub struct DispatchOptions {
    pub tokens_per_user: usize,
    pub deactivate_stale_tokens: bool,
    pub platform: PlatformConfig,
}

impl From<&Config> for DispatchOptions {
    fn from(config: &Config) -> Self {
        DispatchOptions {
            tokens_per_user: config.tokens_per_user,
            deactivate_stale_tokens: config.deactivate_stale_tokens,
            platform: config.platform.clone(),
        }
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        DispatchOptions {
            tokens_per_user: 10,
            deactivate_stale_tokens: true,
            platform: PlatformConfig::default(),
        }
    }
}

/// Slot bookkeeping for in-flight delivery tasks.
struct SpawnedDeliveries {
    join_set: JoinSet<DeliveryResult>,
    /// Maps task ids to the index and token they deliver to
    task_slots: HashMap<tokio::task::Id, (usize, DeviceToken)>,
}

pub struct Dispatcher {
    resolver: TokenResolver,
    store: Arc<dyn TokenStore>,
    transport: Arc<dyn PushTransport>,
    deactivate_stale_tokens: bool,
    platform: PlatformConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn PushTransport>,
        options: DispatchOptions,
    ) -> Self {
        Dispatcher {
            resolver: TokenResolver::new(store.clone(), options.tokens_per_user),
            store,
            transport,
            deactivate_stale_tokens: options.deactivate_stale_tokens,
            platform: options.platform,
        }
    }

    /// Builds the store, transport and HTTP client described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, NotifierError> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let store = get_store(&config.token_store, client.clone())?;
        let transport = get_transport(&config.push_transport, client)?;

        Ok(Self::new(store, transport, DispatchOptions::from(config)))
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Sends `payload` to every token `spec` resolves to.
    ///
    /// Returns `AllFailed` when at least one token was attempted and none
    /// succeeded. Partial failures are reported inside the returned report.
    pub async fn dispatch(
        &self,
        spec: &RecipientSpec,
        payload: NotificationPayload,
    ) -> Result<DeliveryReport, DispatchError> {
        let start = Instant::now();
        payload.validate()?;

        let resolution = self.resolver.resolve(spec).await?;
        let tokens = resolution.tokens;
        if tokens.is_empty() {
            tracing::info!(recipient = spec.kind(), "no tokens resolved");
            return Err(DispatchError::Validation(
                "No FCM tokens found for the given recipient".into(),
            ));
        }

        tracing::info!(
            recipient = spec.kind(),
            tokens = tokens.len(),
            transport = self.transport.name(),
            "dispatching notification"
        );

        let content = Arc::new(MessageContent::new(payload, self.platform.clone()));
        let spawned = self.spawn_deliveries(tokens, content);
        let report = DeliveryReport::from_results(Self::collect_results(spawned).await)
            .with_group(resolution.group);

        histogram!(DISPATCH_DURATION).record(start.elapsed().as_secs_f64());
        tracing::info!(
            total = report.total_tokens,
            success = report.success_count,
            failure = report.failure_count,
            "dispatch finished"
        );

        if report.success_count == 0 {
            return Err(DispatchError::AllFailed(report));
        }
        Ok(report)
    }

    fn spawn_deliveries(
        &self,
        tokens: Vec<DeviceToken>,
        content: Arc<MessageContent>,
    ) -> SpawnedDeliveries {
        let mut join_set = JoinSet::new();
        let mut task_slots = HashMap::new();

        for (index, token) in tokens.into_iter().enumerate() {
            let transport = self.transport.clone();
            let store = self.deactivate_stale_tokens.then(|| self.store.clone());
            let message = PushMessage {
                token: token.clone(),
                content: content.clone(),
            };

            let abort_handle = join_set.spawn(deliver(transport, store, message));
            task_slots.insert(abort_handle.id(), (index, token));
        }

        SpawnedDeliveries {
            join_set,
            task_slots,
        }
    }

    /// Waits for every delivery and orders results by token position.
    async fn collect_results(spawned: SpawnedDeliveries) -> Vec<DeliveryResult> {
        let SpawnedDeliveries {
            mut join_set,
            mut task_slots,
        } = spawned;
        let mut slots: Vec<Option<DeliveryResult>> = vec![None; task_slots.len()];

        while let Some(joined) = join_set.join_next_with_id().await {
            let (task_id, result) = match joined {
                Ok((id, result)) => (id, Some(result)),
                Err(e) => {
                    tracing::error!(error = %e, "delivery task failed");
                    (e.id(), None)
                }
            };

            let Some((index, token)) = task_slots.remove(&task_id) else {
                continue;
            };
            let result = result.unwrap_or_else(|| {
                counter!(DISPATCH_DELIVERIES, "result" => "failure").increment(1);
                DeliveryResult::failed(&token, "delivery task failed".into())
            });
            slots[index] = Some(result);
        }

        slots.into_iter().flatten().collect()
    }
}

async fn deliver(
    transport: Arc<dyn PushTransport>,
    store: Option<Arc<dyn TokenStore>>,
    message: PushMessage,
) -> DeliveryResult {
    match transport.send(&message).await {
        Ok(message_id) => {
            counter!(DISPATCH_DELIVERIES, "result" => "success").increment(1);
            DeliveryResult::delivered(&message.token, message_id)
        }
        Err(error) => {
            counter!(DISPATCH_DELIVERIES, "result" => "failure").increment(1);
            let result = DeliveryResult::failed(&message.token, error.to_string());
            tracing::warn!(token = %result.token, %error, "delivery failed");

            if error.is_stale_token()
                && let Some(store) = store
            {
                match store.deactivate_token(&message.token).await {
                    Ok(()) => {
                        counter!(DISPATCH_STALE_TOKENS).increment(1);
                        tracing::info!(token = %result.token, "deactivated stale token");
                    }
                    Err(e) => {
                        tracing::warn!(token = %result.token, error = %e, "could not deactivate stale token");
                    }
                }
            }

            result
        }
    }
}
