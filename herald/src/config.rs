use gateway::config::Config as GatewayConfig;
use notifier::config::Config as NotifierConfig;
use serde::Deserialize;
use std::fs::File;

const DEFAULT_STATSD_PORT: u16 = 8125;
const DEFAULT_METRICS_PREFIX: &str = "herald";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    #[serde(default = "default_statsd_port")]
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: DEFAULT_LOG_LEVEL.into(),
            format: LogFormat::default(),
            sentry_dsn: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommonConfig {
    metrics: Option<MetricsConfig>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    common: CommonConfig,
    /// Only required by the `gateway` command
    pub gateway: Option<GatewayConfig>,
    pub notifier: NotifierConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn metrics(&self) -> Option<&MetricsConfig> {
        self.common.metrics.as_ref()
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.common.logging
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

fn default_statsd_port() -> u16 {
    DEFAULT_STATSD_PORT
}

fn default_metrics_prefix() -> String {
    DEFAULT_METRICS_PREFIX.into()
}
