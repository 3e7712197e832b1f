use crate::errors::DispatchError;
use crate::store::{GroupMember, TokenStore};
use crate::types::{DeviceToken, GroupSummary, MemberTokens, RecipientSpec, UserRef};
use indexmap::IndexSet;
use std::sync::Arc;

/// The tokens a recipient resolved to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub tokens: Vec<DeviceToken>,
    /// Per-member token counts, set for group recipients only.
    pub group: Option<GroupSummary>,
}

/// Maps a recipient to the device tokens it addresses.
///
/// Store failures never fail a resolution. They are logged and the affected
/// lookup contributes no tokens, so an unreachable store surfaces as an empty
/// token set.
pub struct TokenResolver {
    store: Arc<dyn TokenStore>,
    tokens_per_user: usize,
}

impl TokenResolver {
    pub fn new(store: Arc<dyn TokenStore>, tokens_per_user: usize) -> Self {
        TokenResolver {
            store,
            tokens_per_user,
        }
    }

    /// Resolves `spec` to de-duplicated tokens in first-seen order.
    pub async fn resolve(&self, spec: &RecipientSpec) -> Result<Resolution, DispatchError> {
        let mut tokens = IndexSet::new();
        let mut group_summary = None;

        match spec {
            RecipientSpec::ExplicitTokens(list) => {
                tokens.extend(list.iter().cloned());
            }
            RecipientSpec::SingleToken(token) => {
                tokens.insert(token.clone());
            }
            RecipientSpec::User(UserRef::Id(user_id)) => {
                tokens.extend(self.user_tokens(user_id).await);
            }
            RecipientSpec::User(UserRef::Email(email)) => {
                if let Some(user_id) = self.user_id_for_email(email).await? {
                    tokens.extend(self.user_tokens(&user_id).await);
                }
            }
            RecipientSpec::Group(group) => {
                let members = self.group_members(group).await;
                let mut user_results = Vec::with_capacity(members.len());
                for member in &members {
                    let member_tokens = self.member_tokens(member).await;
                    user_results.push(MemberTokens::new(
                        member.user_id.clone(),
                        member_tokens.len(),
                    ));
                    tokens.extend(member_tokens);
                }
                group_summary = Some(GroupSummary {
                    group_name: group.clone(),
                    total_users: members.len(),
                    user_results,
                });
            }
        }

        tokens.retain(|token: &DeviceToken| !token.trim().is_empty());
        Ok(Resolution {
            tokens: tokens.into_iter().collect(),
            group: group_summary,
        })
    }

    async fn user_id_for_email(&self, email: &str) -> Result<Option<String>, DispatchError> {
        match self.store.find_user_id_by_email(email).await {
            Ok(Some(user_id)) => Ok(Some(user_id)),
            Ok(None) => Err(DispatchError::NotFound("User not found".into())),
            Err(error) => {
                tracing::warn!(%error, "user lookup by email failed");
                Ok(None)
            }
        }
    }

    async fn user_tokens(&self, user_id: &str) -> Vec<DeviceToken> {
        match self
            .store
            .query_active_tokens_by_user(user_id, self.tokens_per_user)
            .await
        {
            Ok(tokens) => tokens,
            Err(error) => {
                tracing::warn!(%error, user_id, "token lookup failed");
                Vec::new()
            }
        }
    }

    async fn group_members(&self, group: &str) -> Vec<GroupMember> {
        match self.store.query_users_in_group(group).await {
            Ok(members) => {
                tracing::debug!(group, members = members.len(), "resolved group");
                members
            }
            Err(error) => {
                tracing::warn!(%error, group, "group lookup failed");
                Vec::new()
            }
        }
    }

    async fn member_tokens(&self, member: &GroupMember) -> Vec<DeviceToken> {
        let mut tokens = self.user_tokens(&member.user_id).await;
        tokens.retain(|token| !token.trim().is_empty());
        if !tokens.is_empty() {
            return tokens;
        }
        member
            .legacy_token
            .iter()
            .filter(|token| !token.trim().is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaticToken, StaticUser};
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;

    fn user(id: &str, email: Option<&str>, groups: &[&str], legacy: Option<&str>) -> StaticUser {
        StaticUser {
            id: id.into(),
            email: email.map(String::from),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            legacy_token: legacy.map(String::from),
        }
    }

    fn token(user_id: &str, token: &str) -> StaticToken {
        StaticToken {
            user_id: user_id.into(),
            token: token.into(),
            active: true,
        }
    }

    fn resolver() -> TokenResolver {
        let store = MemoryStore::new(
            vec![
                user("u1", Some("one@example.com"), &["morning"], None),
                user("u2", None, &["morning"], Some("legacy-2")),
                user("u3", None, &["morning"], Some("legacy-3")),
            ],
            vec![
                token("u1", "shared"),
                token("u1", "t1"),
                token("u3", "shared"),
                token("u3", "t3"),
            ],
        );
        TokenResolver::new(Arc::new(store), 10)
    }

    /// A store where every call fails.
    struct BrokenStore;

    #[async_trait]
    impl TokenStore for BrokenStore {
        async fn query_active_tokens_by_user(
            &self,
            _: &str,
            _: usize,
        ) -> Result<Vec<DeviceToken>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn find_user_id_by_email(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn query_users_in_group(&self, _: &str) -> Result<Vec<GroupMember>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn deactivate_token(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_explicit_tokens_deduplicated() {
        let tokens = resolver()
            .resolve(&RecipientSpec::ExplicitTokens(vec![
                "b".into(),
                "a".into(),
                "b".into(),
                " ".into(),
            ]))
            .await
            .unwrap();
        assert_eq!(tokens.tokens, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(tokens.group, None);
    }

    #[tokio::test]
    async fn test_user_by_id_and_email() {
        let resolver = resolver();

        let by_id = resolver
            .resolve(&RecipientSpec::User(UserRef::Id("u1".into())))
            .await
            .unwrap()
            .tokens;
        assert_eq!(by_id, vec!["shared".to_string(), "t1".to_string()]);

        let by_email = resolver
            .resolve(&RecipientSpec::User(UserRef::Email("one@example.com".into())))
            .await
            .unwrap()
            .tokens;
        assert_eq!(by_email, by_id);

        let unknown = resolver
            .resolve(&RecipientSpec::User(UserRef::Email("nobody@example.com".into())))
            .await;
        assert!(matches!(unknown, Err(DispatchError::NotFound(_))));

        let no_tokens = resolver
            .resolve(&RecipientSpec::User(UserRef::Id("u2".into())))
            .await
            .unwrap();
        assert!(no_tokens.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_group_union_with_legacy_fallback() {
        let resolution = resolver()
            .resolve(&RecipientSpec::Group("morning".into()))
            .await
            .unwrap();

        // u2 has no token records so its legacy token is used; u3 has records
        // so its legacy token is not.
        assert_eq!(
            resolution.tokens,
            vec![
                "shared".to_string(),
                "t1".to_string(),
                "legacy-2".to_string(),
                "t3".to_string(),
            ]
        );

        // Counts are per member, before de-duplication across members.
        assert_eq!(
            resolution.group,
            Some(GroupSummary {
                group_name: "morning".into(),
                total_users: 3,
                user_results: vec![
                    MemberTokens::new("u1".into(), 2),
                    MemberTokens::new("u2".into(), 1),
                    MemberTokens::new("u3".into(), 2),
                ],
            })
        );
    }

    #[tokio::test]
    async fn test_group_members_without_tokens() {
        let store = MemoryStore::new(
            vec![
                user("u1", None, &["evening"], None),
                user("u2", None, &["evening"], Some("legacy-2")),
            ],
            vec![],
        );
        let resolution = TokenResolver::new(Arc::new(store), 10)
            .resolve(&RecipientSpec::Group("evening".into()))
            .await
            .unwrap();

        assert_eq!(resolution.tokens, vec!["legacy-2".to_string()]);
        let group = resolution.group.unwrap();
        assert_eq!(group.total_users, 2);
        assert!(!group.user_results[0].has_token);
        assert!(group.user_results[1].has_token);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_to_no_tokens() {
        let resolver = TokenResolver::new(Arc::new(BrokenStore), 10);

        for spec in [
            RecipientSpec::User(UserRef::Id("u1".into())),
            RecipientSpec::User(UserRef::Email("one@example.com".into())),
            RecipientSpec::Group("morning".into()),
        ] {
            assert!(resolver.resolve(&spec).await.unwrap().tokens.is_empty());
        }

        // Explicit tokens never touch the store.
        assert_eq!(
            resolver
                .resolve(&RecipientSpec::SingleToken("t".into()))
                .await
                .unwrap()
                .tokens,
            vec!["t".to_string()]
        );
    }
}
