use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::DispatchError;

pub type DeviceToken = String;

/// Number of leading token characters kept when a token is logged or reported.
const REDACTED_PREFIX_LEN: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserRef {
    Id(String),
    Email(String),
}

/// Who a notification is addressed to. Exactly one variant per dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipientSpec {
    ExplicitTokens(Vec<DeviceToken>),
    SingleToken(DeviceToken),
    User(UserRef),
    Group(String),
}

/// The loosely-typed recipient fields a request body may carry.
#[derive(Clone, Debug, Default)]
pub struct RecipientFields {
    pub tokens: Option<Vec<String>>,
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub group_name: Option<String>,
}

impl RecipientSpec {
    /// Picks a single recipient variant from the supplied fields.
    ///
    /// Precedence is explicit tokens, single token, user id, user email, group.
    /// Blank strings and empty lists count as absent.
    pub fn from_fields(fields: RecipientFields) -> Option<Self> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        if let Some(tokens) = fields.tokens.filter(|t| !t.is_empty()) {
            return Some(RecipientSpec::ExplicitTokens(tokens));
        }
        if let Some(token) = present(fields.token) {
            return Some(RecipientSpec::SingleToken(token));
        }
        if let Some(id) = present(fields.user_id) {
            return Some(RecipientSpec::User(UserRef::Id(id)));
        }
        if let Some(email) = present(fields.user_email) {
            return Some(RecipientSpec::User(UserRef::Email(email)));
        }
        present(fields.group_name).map(RecipientSpec::Group)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecipientSpec::ExplicitTokens(_) => "tokens",
            RecipientSpec::SingleToken(_) => "token",
            RecipientSpec::User(UserRef::Id(_)) => "user_id",
            RecipientSpec::User(UserRef::Email(_)) => "user_email",
            RecipientSpec::Group(_) => "group",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: IndexMap<String, String>,
    pub image_url: Option<String>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        NotificationPayload {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Replaces the data map with the string-coerced form of a JSON object.
    pub fn with_json_data(mut self, data: &Map<String, Value>) -> Self {
        self.data = coerce_data(data);
        self
    }

    pub fn with_image_url(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.title.is_empty() || self.body.is_empty() {
            return Err(DispatchError::Validation(
                "title and body are required".into(),
            ));
        }
        Ok(())
    }
}

/// The push provider only accepts string values in the data map.
pub fn coerce_data(data: &Map<String, Value>) -> IndexMap<String, String> {
    data.iter()
        .map(|(key, value)| {
            let coerced = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Array(_) | Value::Object(_) => value.to_string(),
            };
            (key.clone(), coerced)
        })
        .collect()
}

pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(REDACTED_PREFIX_LEN).collect();
    format!("{prefix}...")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub token: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(token: &str, message_id: String) -> Self {
        DeliveryResult {
            token: redact_token(token),
            success: true,
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(token: &str, error: String) -> Self {
        DeliveryResult {
            token: redact_token(token),
            success: false,
            message_id: None,
            error: Some(error),
        }
    }
}

/// How many tokens one group member contributed before de-duplication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberTokens {
    pub user_id: String,
    pub token_count: usize,
    pub has_token: bool,
}

impl MemberTokens {
    pub fn new(user_id: String, token_count: usize) -> Self {
        MemberTokens {
            user_id,
            token_count,
            has_token: token_count > 0,
        }
    }
}

/// Group membership found while resolving a `Group` recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub group_name: String,
    pub total_users: usize,
    pub user_results: Vec<MemberTokens>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub total_tokens: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<DeliveryResult>,
    /// Only set when the recipient was a group.
    #[serde(flatten)]
    pub group: Option<GroupSummary>,
}

impl DeliveryReport {
    pub fn from_results(results: Vec<DeliveryResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        DeliveryReport {
            total_tokens: results.len(),
            success_count,
            failure_count: results.len() - success_count,
            results,
            group: None,
        }
    }

    pub fn with_group(mut self, group: Option<GroupSummary>) -> Self {
        self.group = group;
        self
    }

    /// The first per-token error, used as the headline message on total failure.
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|r| r.error.as_deref())
    }
}
