mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::config::TokenStoreConfig;
use crate::credentials::{Credentials, CredentialsError};
use crate::types::DeviceToken;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("store credentials error: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("invalid store url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A user matched by a group query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMember {
    pub user_id: String,
    /// Token stored directly on the user record by older clients
    pub legacy_token: Option<DeviceToken>,
}

/// The document store holding users and their device registrations.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Active tokens registered by `user_id`, at most `limit` of them.
    async fn query_active_tokens_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DeviceToken>, StoreError>;

    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, StoreError>;

    async fn query_users_in_group(&self, group: &str) -> Result<Vec<GroupMember>, StoreError>;

    /// Marks every registration of `token` inactive.
    async fn deactivate_token(&self, token: &str) -> Result<(), StoreError>;
}

pub fn get_store(
    config: &TokenStoreConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn TokenStore>, StoreError> {
    match config {
        TokenStoreConfig::Firestore {
            project_id,
            base_url,
            credentials,
        } => {
            let credentials = Credentials::from_config(credentials)?;
            let project_id = credentials.project_id(project_id.as_deref())?;
            tracing::info!(%project_id, "using firestore token store");
            Ok(Arc::new(FirestoreStore::new(
                client,
                base_url.clone(),
                project_id,
                credentials,
            )))
        }
        TokenStoreConfig::Static { users, tokens } => {
            tracing::info!(
                users = users.len(),
                tokens = tokens.len(),
                "using static token store"
            );
            Ok(Arc::new(MemoryStore::new(users.clone(), tokens.clone())))
        }
    }
}
