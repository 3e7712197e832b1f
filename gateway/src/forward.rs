//! Forwarding of AI chat and image requests to the configured backend.

use crate::config::AiBackendConfig;
use crate::{GatewayResponse, json_response};
use hyper::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

const BACKEND_ERROR: &str = "Backend service error";

/// Picks the error to report for a failed backend response, preferring the
/// backend's own `error` then `details` fields.
fn upstream_error(body: &str) -> Value {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        for key in ["error", "details"] {
            if let Some(value) = fields.get(key)
                && !value.is_null()
            {
                return value.clone();
            }
        }
        return Value::String(BACKEND_ERROR.into());
    }

    let text = body.trim();
    if text.is_empty() {
        Value::String(BACKEND_ERROR.into())
    } else {
        Value::String(text.into())
    }
}

fn internal_error(message: impl std::fmt::Display) -> GatewayResponse {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &json!({"error": "Internal server error", "message": message.to_string()}),
    )
}

pub async fn handle_forward(
    client: &reqwest::Client,
    backend: &AiBackendConfig,
    endpoint: &str,
    body: &[u8],
) -> GatewayResponse {
    if body.iter().all(u8::is_ascii_whitespace) {
        return json_response(
            StatusCode::BAD_REQUEST,
            &json!({"error": "Request body is required"}),
        );
    }
    let request_body = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"error": "Request body is required"}),
            );
        }
        Ok(value) => value,
        Err(_) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &json!({"error": "Invalid JSON in request body"}),
            );
        }
    };

    let url = match backend.endpoint(endpoint) {
        Ok(url) => url,
        Err(e) => return internal_error(e),
    };
    tracing::debug!(%url, "forwarding request");

    let response = match client
        .post(url)
        .timeout(Duration::from_secs(backend.timeout_secs))
        .json(&request_body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, endpoint, "backend request failed");
            return internal_error(e);
        }
    };

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let error = upstream_error(&text);
        tracing::warn!(status = status.as_u16(), endpoint, %error, "backend returned an error");
        return json_response(status, &json!({"error": error, "status": status.as_u16()}));
    }

    match response.json::<Value>().await {
        Ok(data) => json_response(StatusCode::OK, &data),
        Err(e) => internal_error(e),
    }
}
