use crate::GatewayResponse;
use crate::config::{AiBackendConfig, Config, CorsConfig, Listener};
use crate::service::GatewayService;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use notifier::config::{StaticToken, StaticUser};
use notifier::store::MemoryStore;
use notifier::transport::LogTransport;
use notifier::{DispatchOptions, Dispatcher};
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

/// A dispatcher over a small in-memory directory that logs instead of sending.
///
/// - `u1` (`one@example.com`, group `morning`): tokens `tok-a`, `tok-b`
/// - `u2` (group `morning`): no token records, legacy token `legacy-2`
pub fn dispatcher() -> Arc<Dispatcher> {
    let store = MemoryStore::new(
        vec![
            StaticUser {
                id: "u1".into(),
                email: Some("one@example.com".into()),
                groups: vec!["morning".into()],
                legacy_token: None,
            },
            StaticUser {
                id: "u2".into(),
                email: None,
                groups: vec!["morning".into()],
                legacy_token: Some("legacy-2".into()),
            },
        ],
        vec![
            StaticToken {
                user_id: "u1".into(),
                token: "tok-a".into(),
                active: true,
            },
            StaticToken {
                user_id: "u1".into(),
                token: "tok-b".into(),
                active: true,
            },
        ],
    );

    Arc::new(Dispatcher::new(
        Arc::new(store),
        Arc::new(LogTransport::new()),
        DispatchOptions::default(),
    ))
}

pub async fn body_json(response: GatewayResponse) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body is readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Serves a [`GatewayService`] on an ephemeral local port.
pub async fn start_gateway(dispatcher: Arc<Dispatcher>) -> Url {
    let config = Config {
        listener: Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        },
        admin_listener: Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        },
        cors: CorsConfig::default(),
        max_body_bytes: 1024,
        ai_backend: AiBackendConfig::default(),
        email_relay: None,
    };
    let service = Arc::new(GatewayService::new(config, dispatcher).expect("valid test config"));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let service = service.clone();
            tokio::spawn(async move {
                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Url::parse(&format!("http://127.0.0.1:{port}/")).expect("Failed to parse URL")
}

pub struct RecordedRequest {
    pub method: Method,
    pub uri: String,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

/// A stand-in upstream answering every request with the output of a closure.
pub struct TestServer {
    pub url: Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl TestServer {
    pub fn requests(&self) -> parking_lot::MutexGuard<'_, Vec<RecordedRequest>> {
        self.requests.lock()
    }
}

pub async fn start_test_server<F>(respond: F) -> TestServer
where
    F: Fn(&RecordedRequest) -> (StatusCode, serde_json::Value) + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond = Arc::new(respond);
    let recorded = requests.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let respond = respond.clone();
            let recorded = recorded.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let respond = respond.clone();
                    let recorded = recorded.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body
                            .collect()
                            .await
                            .map(|collected| collected.to_bytes())
                            .unwrap_or_default();

                        let request = RecordedRequest {
                            method: parts.method,
                            uri: parts.uri.to_string(),
                            body,
                        };
                        let (status, value) = respond(&request);
                        recorded.lock().push(request);

                        let mut response = Response::new(Full::new(Bytes::from(value.to_string())));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });

                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    TestServer {
        url: Url::parse(&format!("http://127.0.0.1:{port}/")).expect("Failed to parse URL"),
        requests,
    }
}
