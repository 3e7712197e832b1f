use super::{GroupMember, StoreError, TokenStore};
use crate::config::{StaticToken, StaticUser};
use crate::types::DeviceToken;
use async_trait::async_trait;
use parking_lot::RwLock;

/// Token store backed by users and tokens listed in the config file.
///
/// Deactivation only lasts for the lifetime of the process.
pub struct MemoryStore {
    users: Vec<StaticUser>,
    tokens: RwLock<Vec<StaticToken>>,
}

impl MemoryStore {
    pub fn new(users: Vec<StaticUser>, tokens: Vec<StaticToken>) -> Self {
        MemoryStore {
            users,
            tokens: RwLock::new(tokens),
        }
    }

    pub fn is_active(&self, token: &str) -> bool {
        self.tokens
            .read()
            .iter()
            .any(|t| t.token == token && t.active)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn query_active_tokens_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DeviceToken>, StoreError> {
        Ok(self
            .tokens
            .read()
            .iter()
            .filter(|t| t.user_id == user_id && t.active)
            .take(limit)
            .map(|t| t.token.clone())
            .collect())
    }

    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .map(|u| u.id.clone()))
    }

    async fn query_users_in_group(&self, group: &str) -> Result<Vec<GroupMember>, StoreError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.groups.iter().any(|g| g == group))
            .map(|u| GroupMember {
                user_id: u.id.clone(),
                legacy_token: u.legacy_token.clone(),
            })
            .collect())
    }

    async fn deactivate_token(&self, token: &str) -> Result<(), StoreError> {
        for record in self.tokens.write().iter_mut().filter(|t| t.token == token) {
            record.active = false;
        }
        Ok(())
    }
}
