use reqwest::StatusCode;
use thiserror::Error;

use crate::config::ConfigError;

/// Every way a call through [`crate::ApiClient`] can fail.
///
/// Nothing below the entry point recovers from these; callers match on the
/// variant to decide what to report.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The identity provider refused to issue a token, or could not be asked.
    #[error("failed to acquire token: {0}")]
    Authentication(String),

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// The downstream API answered with a non-2xx status.
    #[error("{status} for url: {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Status code of the downstream response, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the API rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}
