//! The notification routes. Request bodies are mapped onto a recipient and a
//! payload, handed to the dispatcher, and its outcome mapped to a status code.

use crate::{GatewayResponse, json_response};
use hyper::StatusCode;
use notifier::{
    DeliveryReport, DispatchError, Dispatcher, NotificationPayload, RecipientFields, RecipientSpec,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data value marking notifications sent to a group from the dashboard.
const GROUP_SOURCE: &str = "dashboard";

/// Which recipients a route accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Any recipient field, picked by precedence.
    Any,
    /// Only `groupName`, which is then required.
    Group,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub fcm_token: Option<String>,
    pub tokens: Option<Vec<String>>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub group_name: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<Value>,
    pub image_url: Option<String>,
}

impl SendNotificationRequest {
    fn take_payload(&mut self, audience: Audience) -> NotificationPayload {
        let mut payload = NotificationPayload::new(
            self.title.take().unwrap_or_default(),
            self.body.take().unwrap_or_default(),
        )
        .with_image_url(self.image_url.take());

        match self.data.take() {
            Some(Value::Object(data)) => payload = payload.with_json_data(&data),
            Some(Value::Null) | None => {}
            Some(other) => tracing::debug!(?other, "ignoring non-object data"),
        }

        if audience == Audience::Group
            && let Some(group_name) = &self.group_name
        {
            payload.data.insert("source".into(), GROUP_SOURCE.into());
            payload.data.insert("groupName".into(), group_name.clone());
        }
        payload
    }

    fn recipient(self, audience: Audience) -> Option<RecipientSpec> {
        match audience {
            Audience::Group => self
                .group_name
                .filter(|name| !name.trim().is_empty())
                .map(RecipientSpec::Group),
            Audience::Any => RecipientSpec::from_fields(RecipientFields {
                tokens: self.tokens,
                token: self.fcm_token,
                user_id: self.user_id,
                user_email: self.user_email,
                group_name: self.group_name,
            }),
        }
    }
}

#[derive(Serialize)]
struct SentBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(flatten)]
    report: &'a DeliveryReport,
}

#[derive(Serialize)]
struct FailedBody<'a> {
    success: bool,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a DeliveryReport>,
}

fn failure(status: StatusCode, error: &str) -> GatewayResponse {
    json_response(
        status,
        &FailedBody {
            success: false,
            error,
            message: None,
            details: None,
        },
    )
}

fn dispatch_error_response(error: &DispatchError) -> GatewayResponse {
    match error {
        DispatchError::Validation(message) => failure(StatusCode::BAD_REQUEST, message),
        DispatchError::NotFound(message) => failure(StatusCode::NOT_FOUND, message),
        DispatchError::AllFailed(report) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &FailedBody {
                success: false,
                error: "Failed to send notification",
                message: Some(report.first_error().unwrap_or("Unknown error")),
                details: Some(report),
            },
        ),
    }
}

pub async fn handle_send(dispatcher: &Dispatcher, body: &[u8], audience: Audience) -> GatewayResponse {
    let mut request = if body.iter().all(u8::is_ascii_whitespace) {
        SendNotificationRequest::default()
    } else {
        match serde_json::from_slice::<SendNotificationRequest>(body) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "invalid notification request body");
                return failure(StatusCode::BAD_REQUEST, "Invalid JSON in request body");
            }
        }
    };

    if audience == Audience::Group
        && request
            .group_name
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
    {
        return failure(StatusCode::BAD_REQUEST, "Group name is required");
    }

    let payload = request.take_payload(audience);
    if let Err(e) = payload.validate() {
        return dispatch_error_response(&e);
    }

    let Some(recipient) = request.recipient(audience) else {
        return failure(
            StatusCode::BAD_REQUEST,
            "Missing FCM token(s): provide tokens, fcmToken, userId, userEmail or groupName",
        );
    };

    match dispatcher.dispatch(&recipient, payload).await {
        Ok(report) => json_response(
            StatusCode::OK,
            &SentBody {
                success: true,
                message: "Notification sent successfully",
                report: &report,
            },
        ),
        Err(e) => {
            if let DispatchError::AllFailed(_) = &e {
                tracing::error!(recipient = recipient.kind(), error = %e, "notification failed");
            }
            dispatch_error_response(&e)
        }
    }
}
