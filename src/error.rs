use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Error, Debug)]
pub enum CrewError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Agent not found: {0}")]
    UnknownAgent(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

// Conversion implementations for common error types
impl From<std::io::Error> for CrewError {
    fn from(err: std::io::Error) -> Self {
        CrewError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for CrewError {
    fn from(err: serde_json::Error) -> Self {
        CrewError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for CrewError {
    fn from(err: toml::de::Error) -> Self {
        CrewError::Configuration(err.to_string())
    }
}

impl From<reqwest::Error> for CrewError {
    fn from(err: reqwest::Error) -> Self {
        CrewError::Network(err.to_string())
    }
}
