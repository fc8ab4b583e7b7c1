//! Error types for Skycast

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkycastError>;

/// Pipeline stage that performs external calls during composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExternalLink,
    Images,
    Quote,
    Thread,
    Repost,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ExternalLink => "external link embed",
            Stage::Images => "image embed",
            Stage::Quote => "quote embed",
            Stage::Thread => "reply thread",
            Stage::Repost => "repost",
            Stage::Submit => "record creation",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum SkycastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Caller input is structurally invalid; raised before any network call
    /// whenever it can be detected up front.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unexpected response: {0}")]
    Decode(String),

    /// A fatal failure while resolving part of the post.
    #[error("{stage} failed for '{input}': {source}")]
    Resolution {
        stage: Stage,
        input: String,
        #[source]
        source: Box<SkycastError>,
    },
}

impl SkycastError {
    /// Wrap an error with the stage and input that produced it.
    ///
    /// Cancellation passes through untouched so callers can tell an abandoned
    /// pipeline from a failed one.
    pub fn at_stage(self, stage: Stage, input: impl Into<String>) -> Self {
        match self {
            SkycastError::Cancelled => SkycastError::Cancelled,
            other => SkycastError::Resolution {
                stage,
                input: input.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SkycastError::Validation(_) => 3,
            SkycastError::Authentication(_) => 2,
            SkycastError::Resolution { source, .. } => source.exit_code(),
            _ => 1,
        }
    }

    /// True for errors raised by the network layer, including cancellation.
    pub fn is_transport(&self) -> bool {
        match self {
            SkycastError::Transport(_) | SkycastError::Cancelled => true,
            SkycastError::Resolution { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl From<reqwest::Error> for SkycastError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SkycastError::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SkycastError::Decode(err.to_string())
        } else {
            SkycastError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SkycastError {
    fn from(err: serde_json::Error) -> Self {
        SkycastError::Decode(err.to_string())
    }
}
