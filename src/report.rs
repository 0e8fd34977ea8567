//! Turns the outcome of a call into the text the `client` binary prints.

use serde_json::Value;

use crate::error::Error;

/// How a failed call is presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The API returned 401: the token is invalid or expired.
    Unauthorized,
    /// Any other non-2xx answer.
    Http,
    Other,
}

impl FailureKind {
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::HttpStatus { .. } if err.is_unauthorized() => FailureKind::Unauthorized,
            Error::HttpStatus { .. } => FailureKind::Http,
            _ => FailureKind::Other,
        }
    }
}

pub fn describe_failure(err: &Error) -> String {
    match FailureKind::classify(err) {
        FailureKind::Unauthorized => {
            "Authentication error: the access token is invalid or expired".to_string()
        }
        FailureKind::Http => format!("HTTP error: {err}"),
        FailureKind::Other => format!("Error: {err}"),
    }
}

pub fn describe_response(value: &Value) -> String {
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("=== API Response ===\n{body}")
}
