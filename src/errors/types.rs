use thiserror::Error;

#[derive(Debug, Error)]
pub enum DastError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Authentication configuration failed: {0}")]
    Authentication(String),

    #[error("Scan engine unreachable: {0}")]
    EngineUnreachable(String),

    #[error("Scan engine error: {0}")]
    Engine(String),

    #[error("Malformed engine response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for DastError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DastError::Timeout(e.to_string())
        } else if e.is_decode() {
            DastError::MalformedResponse(e.to_string())
        } else {
            DastError::Network(e.to_string())
        }
    }
}
