mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LogFormat, LoggingConfig, MetricsConfig};
use gateway::errors::GatewayError;
use metrics_exporter_statsd::StatsdBuilder;
use notifier::{
    DispatchError, Dispatcher, NotificationPayload, NotifierError, RecipientFields, RecipientSpec,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[derive(Parser)]
#[command(name = "herald", about = "Push notification dispatcher")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the HTTP API
    Gateway {
        #[arg(long)]
        config: PathBuf,
    },
    /// Dispatch a single notification and print the delivery report
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long)]
    config: PathBuf,

    /// Device token, may be repeated
    #[arg(long = "token")]
    tokens: Vec<String>,

    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    user_email: Option<String>,

    #[arg(long)]
    group: Option<String>,

    #[arg(long)]
    title: String,

    #[arg(long)]
    body: String,

    /// Extra data entry as key=value, may be repeated
    #[arg(long = "data", value_parser = parse_key_value)]
    data: Vec<(String, String)>,

    #[arg(long)]
    image_url: Option<String>,
}

impl SendArgs {
    fn config_path(&self) -> &PathBuf {
        &self.config
    }

    fn recipient(&self) -> Option<RecipientSpec> {
        RecipientSpec::from_fields(RecipientFields {
            tokens: Some(self.tokens.clone()),
            token: None,
            user_id: self.user_id.clone(),
            user_email: self.user_email.clone(),
            group_name: self.group.clone(),
        })
    }

    fn payload(&self) -> NotificationPayload {
        let mut payload = NotificationPayload::new(&self.title, &self.body)
            .with_image_url(self.image_url.clone());
        payload.data = self.data.iter().cloned().collect();
        payload
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{s}`")),
    }
}

#[derive(thiserror::Error, Debug)]
enum HeraldError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("config has no gateway section")]
    MissingGatewayConfig,

    #[error("one of --token, --user-id, --user-email or --group is required")]
    MissingRecipient,

    #[error("failed to set up metrics: {0}")]
    Metrics(String),

    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Notifier(#[from] NotifierError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        CliCommand::Gateway { config } => config,
        CliCommand::Send(args) => args.config_path(),
    };
    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry = init_logging(config.logging());

    if let Some(metrics) = config.metrics()
        && let Err(e) = init_statsd(metrics)
    {
        tracing::error!(error = %e, "metrics disabled");
    }

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(HeraldError::from)
        .and_then(|runtime| runtime.block_on(run(cli.command, config)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(HeraldError::Dispatch(DispatchError::AllFailed(report))) => {
            if let Ok(json) = serde_json::to_string_pretty(&report) {
                println!("{json}");
            }
            tracing::error!(total = report.total_tokens, "no token accepted the notification");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "herald exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: CliCommand, config: Config) -> Result<(), HeraldError> {
    let dispatcher = Arc::new(Dispatcher::from_config(&config.notifier)?);

    match command {
        CliCommand::Gateway { .. } => {
            let gateway_config = config.gateway.ok_or(HeraldError::MissingGatewayConfig)?;
            gateway::run(gateway_config, dispatcher).await?;
        }
        CliCommand::Send(args) => {
            let recipient = args.recipient().ok_or(HeraldError::MissingRecipient)?;
            let report = dispatcher.dispatch(&recipient, args.payload()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Installs the global subscriber. The returned guard flushes Sentry on drop.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let fmt_layer = match logging.format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };
    let sentry_layer = guard
        .is_some()
        .then(sentry::integrations::tracing::layer);

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str())),
        )
        .with(fmt_layer)
        .with(sentry_layer)
        .init();

    guard
}

fn init_statsd(metrics: &MetricsConfig) -> Result<(), HeraldError> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.clone(), metrics.statsd_port)
        .build(Some(metrics.prefix.as_str()))
        .map_err(|e| HeraldError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| HeraldError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(notifier::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(gateway::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "sending metrics to statsd"
    );
    Ok(())
}
