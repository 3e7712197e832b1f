mod booster_email;
pub mod config;
pub mod errors;
mod forward;
pub mod metrics_defs;
mod notifications;
mod service;

#[cfg(test)]
mod testutils;

use errors::GatewayError;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use notifier::Dispatcher;
use serde::Serialize;
use shared::admin_service::AdminService;
use shared::http::{make_json_response, run_http_service};
use std::sync::Arc;

pub use service::{GatewayService, Route};

pub(crate) type GatewayResponse = Response<BoxBody<Bytes, GatewayError>>;

pub(crate) fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> GatewayResponse {
    make_json_response(status, value)
}

/// Serves the API on the main listener and health probes on the admin listener
/// until either listener fails.
pub async fn run(config: config::Config, dispatcher: Arc<Dispatcher>) -> Result<(), GatewayError> {
    config.validate()?;

    let listener = config.listener.clone();
    let admin_listener = config.admin_listener.clone();
    tracing::info!(
        transport = dispatcher.transport_name(),
        "starting notification gateway"
    );

    let gateway_service = GatewayService::new(config, dispatcher)?;
    let admin_service = AdminService::<_, GatewayError>::new(|| true);

    let gateway_task = run_http_service(&listener.host, listener.port, gateway_service);
    let admin_task = run_http_service(&admin_listener.host, admin_listener.port, admin_service);

    tokio::try_join!(gateway_task, admin_task)?;
    Ok(())
}
