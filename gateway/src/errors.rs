use thiserror::Error;

/// Errors that can occur while running the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid gateway config: {0}")]
    Config(#[from] crate::config::ValidationError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),
}
