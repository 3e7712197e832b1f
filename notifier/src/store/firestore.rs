//! Token store backed by Cloud Firestore, reached through its REST API.
//!
//! Layout of the collections:
//! - `users/{id}`: `email`, `group_names` (array), optional legacy `fcm_token`
//! - `fcm_tokens/{id}`: `userId`, `token`, `active`

use super::{GroupMember, StoreError, TokenStore};
use crate::config::as_base_url;
use crate::credentials::Credentials;
use crate::types::DeviceToken;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use url::Url;

const USERS_COLLECTION: &str = "users";
const TOKENS_COLLECTION: &str = "fcm_tokens";

#[derive(Deserialize)]
struct RunQueryItem {
    document: Option<Document>,
}

#[derive(Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

impl Document {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    fn string_field(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)?
            .get("stringValue")?
            .as_str()
            .map(String::from)
    }
}

fn field_filter(field: &str, op: &str, value: Value) -> Value {
    json!({
        "fieldFilter": {
            "field": {"fieldPath": field},
            "op": op,
            "value": value,
        }
    })
}

fn structured_query(collection: &str, mut filters: Vec<Value>, limit: Option<usize>) -> Value {
    let where_clause = if filters.len() == 1 {
        filters.remove(0)
    } else {
        json!({"compositeFilter": {"op": "AND", "filters": filters}})
    };

    let mut query = json!({
        "from": [{"collectionId": collection}],
        "where": where_clause,
    });
    if let Some(limit) = limit {
        query["limit"] = json!(limit);
    }

    json!({"structuredQuery": query})
}

pub struct FirestoreStore {
    client: reqwest::Client,
    base_url: Url,
    documents_path: String,
    credentials: Credentials,
}

impl FirestoreStore {
    pub fn new(
        client: reqwest::Client,
        base_url: Url,
        project_id: String,
        credentials: Credentials,
    ) -> Self {
        FirestoreStore {
            client,
            base_url: as_base_url(base_url),
            documents_path: format!("projects/{project_id}/databases/(default)/documents"),
            credentials,
        }
    }

    async fn run_query(&self, query: Value) -> Result<Vec<Document>, StoreError> {
        let url = self
            .base_url
            .join(&format!("{}:runQuery", self.documents_path))?;
        let auth = self.credentials.headers().await?;

        let response = self
            .client
            .post(url)
            .headers(auth)
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let items = response.json::<Vec<RunQueryItem>>().await?;
        Ok(items.into_iter().filter_map(|item| item.document).collect())
    }

    async fn set_inactive(&self, document: &Document) -> Result<(), StoreError> {
        let url = self.base_url.join(&document.name)?;
        let auth = self.credentials.headers().await?;

        let response = self
            .client
            .patch(url)
            .query(&[("updateMask.fieldPaths", "active")])
            .headers(auth)
            .json(&json!({"fields": {"active": {"booleanValue": false}}}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FirestoreStore {
    async fn query_active_tokens_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<DeviceToken>, StoreError> {
        let query = structured_query(
            TOKENS_COLLECTION,
            vec![
                field_filter("userId", "EQUAL", json!({"stringValue": user_id})),
                field_filter("active", "EQUAL", json!({"booleanValue": true})),
            ],
            Some(limit),
        );

        let documents = self.run_query(query).await?;
        Ok(documents
            .iter()
            .filter_map(|doc| doc.string_field("token"))
            .filter(|token| !token.is_empty())
            .collect())
    }

    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, StoreError> {
        let query = structured_query(
            USERS_COLLECTION,
            vec![field_filter("email", "EQUAL", json!({"stringValue": email}))],
            Some(1),
        );

        let documents = self.run_query(query).await?;
        Ok(documents.first().map(|doc| doc.id().to_string()))
    }

    async fn query_users_in_group(&self, group: &str) -> Result<Vec<GroupMember>, StoreError> {
        let query = structured_query(
            USERS_COLLECTION,
            vec![field_filter(
                "group_names",
                "ARRAY_CONTAINS",
                json!({"stringValue": group}),
            )],
            None,
        );

        let documents = self.run_query(query).await?;
        Ok(documents
            .iter()
            .map(|doc| GroupMember {
                user_id: doc.id().to_string(),
                legacy_token: doc.string_field("fcm_token").filter(|t| !t.is_empty()),
            })
            .collect())
    }

    async fn deactivate_token(&self, token: &str) -> Result<(), StoreError> {
        let query = structured_query(
            TOKENS_COLLECTION,
            vec![field_filter("token", "EQUAL", json!({"stringValue": token}))],
            None,
        );

        for document in self.run_query(query).await? {
            self.set_inactive(&document).await?;
        }
        Ok(())
    }
}
