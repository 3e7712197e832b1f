use crate::config::EmailRelayConfig;
use crate::{GatewayResponse, json_response};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

const DEFAULT_TITLE: &str = "🚀 בקשה להצטרפות לתכנית הבוסטר";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoosterEmailRequest {
    coach_email: Option<String>,
    user_name: Option<String>,
    user_email: Option<String>,
    title: Option<String>,
    message: Option<String>,
}

impl BoosterEmailRequest {
    fn title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }

    fn text(&self) -> String {
        if let Some(message) = self.message.as_deref()
            && !message.trim().is_empty()
        {
            return message.to_string();
        }

        let trainee = self
            .user_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.user_email.as_deref())
            .unwrap_or_default();
        format!("המתאמן/ת {trainee} מבקש/ת להצטרף לתכנית הבוסטר.")
    }
}

fn failure(status: StatusCode, error: &str) -> GatewayResponse {
    json_response(status, &json!({"success": false, "error": error}))
}

/// Asks the email relay to notify a coach that a trainee wants to join the
/// booster program.
pub async fn handle_booster_email(
    client: &reqwest::Client,
    relay: Option<&EmailRelayConfig>,
    body: &[u8],
) -> GatewayResponse {
    let Some(relay) = relay else {
        return failure(StatusCode::SERVICE_UNAVAILABLE, "Email relay is not configured");
    };

    let request = match serde_json::from_slice::<BoosterEmailRequest>(body) {
        Ok(request) => request,
        Err(_) if body.iter().all(u8::is_ascii_whitespace) => BoosterEmailRequest::default(),
        Err(_) => return failure(StatusCode::BAD_REQUEST, "Invalid JSON in request body"),
    };

    let Some(coach_email) = request.coach_email.as_deref().filter(|e| !e.trim().is_empty())
    else {
        return failure(StatusCode::BAD_REQUEST, "Coach email is required");
    };

    let text = request.text();
    let result = client
        .get(relay.url.clone())
        .query(&[
            ("email", coach_email),
            ("project_id", relay.project_id.as_str()),
            ("template_id", relay.template_id.as_str()),
            ("title", request.title()),
            ("text", text.as_str()),
        ])
        .timeout(Duration::from_secs(relay.timeout_secs))
        .send()
        .await;

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "email relay request failed");
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({"success": false, "error": "Internal server error", "details": e.to_string()}),
            );
        }
    };

    let status = response.status();
    let relay_body = response.json::<Value>().await.unwrap_or(Value::Null);

    if status.is_success() {
        tracing::info!("sent booster request email");
        let message_id = relay_body
            .get("messageId")
            .filter(|id| !id.is_null())
            .cloned()
            .unwrap_or_else(|| json!("sent"));
        return json_response(
            StatusCode::OK,
            &json!({"success": true, "messageId": message_id, "email": coach_email}),
        );
    }

    tracing::error!(status = status.as_u16(), "email relay rejected booster request");
    let error = relay_body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Failed to send email");
    failure(StatusCode::INTERNAL_SERVER_ERROR, error)
}
