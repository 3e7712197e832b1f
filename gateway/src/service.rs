use crate::booster_email::handle_booster_email;
use crate::config::Config;
use crate::errors::GatewayError;
use crate::forward::handle_forward;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::notifications::{Audience, handle_send};
use crate::{GatewayResponse, json_response};
use http::HeaderValue;
use http_body_util::{BodyExt, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, StatusCode};
use notifier::Dispatcher;
use serde_json::json;
use shared::http::{add_cors_headers, full_body};
use shared::{gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    SendNotification,
    SendGroupNotification,
    ProxyAi,
    ProxyImage,
    SendBoosterEmail,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/api/send-notification" => Some(Route::SendNotification),
            "/api/send-group-notification" => Some(Route::SendGroupNotification),
            "/api/proxy-ai" => Some(Route::ProxyAi),
            "/api/proxy-image" => Some(Route::ProxyImage),
            "/api/send-booster-email" => Some(Route::SendBoosterEmail),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::SendNotification => "send_notification",
            Route::SendGroupNotification => "send_group_notification",
            Route::ProxyAi => "proxy_ai",
            Route::ProxyImage => "proxy_image",
            Route::SendBoosterEmail => "send_booster_email",
        }
    }
}

/// Counts a request in `requests.inflight` until dropped, including when the
/// connection goes away before the response is ready.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

struct GatewayState {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    client: reqwest::Client,
    allow_origin: HeaderValue,
}

impl GatewayState {
    async fn handle(&self, method: Method, route: Option<Route>, body: Incoming) -> GatewayResponse {
        if method == Method::OPTIONS {
            return GatewayResponse::new(full_body(Bytes::new()));
        }

        let Some(route) = route else {
            return json_response(StatusCode::NOT_FOUND, &json!({"error": "Not found"}));
        };
        if method != Method::POST {
            return json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &json!({"error": "Method not allowed"}),
            );
        }

        let body = match read_body(body, self.config.max_body_bytes).await {
            Ok(body) => body,
            Err(e @ GatewayError::BodyTooLarge(_)) => {
                return json_response(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &json!({"error": e.to_string()}),
                );
            }
            Err(e) => {
                tracing::debug!(error = %e, "could not read request body");
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &json!({"error": "Could not parse request body", "details": e.to_string()}),
                );
            }
        };

        self.route(route, &body).await
    }

    async fn route(&self, route: Route, body: &[u8]) -> GatewayResponse {
        match route {
            Route::SendNotification => handle_send(&self.dispatcher, body, Audience::Any).await,
            Route::SendGroupNotification => {
                handle_send(&self.dispatcher, body, Audience::Group).await
            }
            Route::ProxyAi => {
                handle_forward(&self.client, &self.config.ai_backend, "chat", body).await
            }
            Route::ProxyImage => {
                handle_forward(&self.client, &self.config.ai_backend, "generate", body)
                    .await
            }
            Route::SendBoosterEmail => {
                handle_booster_email(&self.client, self.config.email_relay.as_ref(), body).await
            }
        }
    }
}

async fn read_body(body: Incoming, limit: usize) -> Result<Bytes, GatewayError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<http_body_util::LengthLimitError>() => {
            Err(GatewayError::BodyTooLarge(limit))
        }
        Err(e) => Err(GatewayError::RequestBody(e.to_string())),
    }
}

/// Serves the public API routes. Every response carries CORS headers.
pub struct GatewayService {
    state: Arc<GatewayState>,
}

impl GatewayService {
    pub fn new(config: Config, dispatcher: Arc<Dispatcher>) -> Result<Self, GatewayError> {
        let allow_origin = config.cors.allow_origin_header()?;
        let client = reqwest::Client::builder().build()?;

        Ok(GatewayService {
            state: Arc::new(GatewayState {
                config,
                dispatcher,
                client,
                allow_origin,
            }),
        })
    }
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = GatewayResponse;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();

        Box::pin(async move {
            let start = Instant::now();
            let inflight = InflightGuard::new();

            let (parts, body) = req.into_parts();
            let route = Route::from_path(parts.uri.path());
            let mut response = state.handle(parts.method.clone(), route, body).await;
            add_cors_headers(response.headers_mut(), &state.allow_origin);

            drop(inflight);
            histogram!(
                REQUEST_DURATION,
                "route" => route.map_or("unknown", |r| r.name()),
                "status" => response.status().as_u16().to_string()
            )
            .record(start.elapsed().as_secs_f64());

            tracing::debug!(
                method = %parts.method,
                path = parts.uri.path(),
                status = response.status().as_u16(),
                "handled request"
            );
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{dispatcher, start_gateway};
    use serde_json::Value;

    #[test]
    fn test_route_from_path() {
        assert_eq!(
            Route::from_path("/api/send-notification"),
            Some(Route::SendNotification)
        );
        assert_eq!(
            Route::from_path("/api/send-group-notification/"),
            Some(Route::SendGroupNotification)
        );
        assert_eq!(Route::from_path("/api/proxy-image"), Some(Route::ProxyImage));
        assert_eq!(Route::from_path("/api/unknown"), None);
        assert_eq!(Route::from_path("/"), None);
    }

    #[derive(Default)]
    struct InflightRecorder(Arc<InflightGauge>);

    #[derive(Default)]
    struct InflightGauge(parking_lot::Mutex<f64>);

    impl InflightGauge {
        fn value(&self) -> f64 {
            *self.0.lock()
        }
    }

    impl metrics::GaugeFn for InflightGauge {
        fn increment(&self, value: f64) {
            *self.0.lock() += value;
        }

        fn decrement(&self, value: f64) {
            *self.0.lock() -= value;
        }

        fn set(&self, value: f64) {
            *self.0.lock() = value;
        }
    }

    impl metrics::Recorder for InflightRecorder {
        fn describe_counter(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }
        fn describe_gauge(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }
        fn describe_histogram(
            &self,
            _: metrics::KeyName,
            _: Option<metrics::Unit>,
            _: metrics::SharedString,
        ) {
        }

        fn register_counter(
            &self,
            _: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Counter {
            metrics::Counter::noop()
        }

        fn register_gauge(&self, key: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            assert_eq!(key.name(), REQUESTS_INFLIGHT.name);
            metrics::Gauge::from_arc(self.0.clone())
        }

        fn register_histogram(
            &self,
            _: &metrics::Key,
            _: &metrics::Metadata<'_>,
        ) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_inflight_released_when_request_is_abandoned() {
        let recorder = InflightRecorder::default();
        let gauge = recorder.0.clone();

        metrics::with_local_recorder(&recorder, || {
            let guard = InflightGuard::new();
            assert_eq!(gauge.value(), 1.0);
            drop(guard);
            assert_eq!(gauge.value(), 0.0);

            // A handler future dropped mid-flight, as when the client disconnects.
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            runtime.block_on(async {
                let handler = async {
                    let _inflight = InflightGuard::new();
                    std::future::pending::<()>().await;
                };
                let result =
                    tokio::time::timeout(std::time::Duration::from_millis(10), handler).await;
                assert!(result.is_err());
            });
            assert_eq!(gauge.value(), 0.0);
        });
    }

    #[tokio::test]
    async fn test_preflight_and_cors() {
        let url = start_gateway(dispatcher()).await;
        let client = reqwest::Client::new();

        let response = client
            .request(Method::OPTIONS, url.join("api/send-notification").unwrap())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-methods")
                .unwrap(),
            "GET,OPTIONS,PATCH,DELETE,POST,PUT"
        );
        assert!(response.text().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_method_not_allowed_and_not_found() {
        let url = start_gateway(dispatcher()).await;
        let client = reqwest::Client::new();

        let response = client
            .get(url.join("api/send-notification").unwrap())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(response.headers().contains_key("access-control-allow-origin"));
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Method not allowed");

        let response = client
            .post(url.join("api/nothing-here").unwrap())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_notification_end_to_end() {
        let url = start_gateway(dispatcher()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(url.join("api/send-group-notification").unwrap())
            .json(&json!({"groupName": "morning", "title": "Class", "body": "Starts soon"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["totalTokens"], 3);
        assert_eq!(body["results"][0]["token"], "tok-a...");
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let url = start_gateway(dispatcher()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(url.join("api/send-notification").unwrap())
            .body(vec![b' '; 4096])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
