//! Error handling

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, warn};

/// Errors raised by the remote calls and file writes inside a pipeline run.
///
/// Stage boundaries convert these into fallbacks or failed image results, so
/// they only reach callers through [`crate::pipeline::StageEvent`] details.
#[derive(Debug)]
pub enum PipelineError {
    /// The request could not be sent or the body could not be read
    Http(reqwest::Error),
    /// The remote service answered with a non-success status
    Status {
        /// which endpoint answered
        endpoint: &'static str,
        /// the HTTP status received
        status: reqwest::StatusCode,
    },
    /// The remote payload did not have the expected shape
    Parse(String),
    /// Local filesystem failure
    Io(std::io::Error),
    /// The record could not be serialized
    Serialize(serde_json::Error),
    /// Polling gave up before the job reached a terminal status
    Timeout {
        /// how many status checks were made
        polls: u32,
        /// total time spent waiting
        waited: Duration,
    },
    /// Missing or invalid configuration
    Config(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(err) => write!(f, "HTTP request failed: {err}"),
            Self::Status { endpoint, status } => write!(f, "{endpoint} returned {status}"),
            Self::Parse(message) => write!(f, "Unexpected response payload: {message}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Serialize(err) => write!(f, "Failed to serialize record: {err}"),
            Self::Timeout { polls, waited } => write!(
                f,
                "Job still running after {polls} status checks ({}s)",
                waited.as_secs()
            ),
            Self::Config(message) => write!(f, "Configuration error: {message}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Serialize(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Http(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialize(err)
    }
}

impl From<url::ParseError> for PipelineError {
    fn from(err: url::ParseError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Errors returned by the webhook endpoints.
#[derive(Debug)]
pub enum WebhookError {
    /// Signature missing or wrong
    Unauthorized,
    /// The run did not finish within the allowed time
    Timeout,
    /// The run finished without producing content
    GenerationFailed(Option<String>),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<PipelineError> for WebhookError {
    fn from(err: PipelineError) -> Self {
        WebhookError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WebhookError::Unauthorized => {
                warn!("Invalid webhook signature");
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "Invalid signature"})),
                )
                    .into_response()
            }
            WebhookError::Timeout => {
                error!("Content generation via webhook timed out");
                (
                    StatusCode::REQUEST_TIMEOUT,
                    Json(json!({
                        "status": "error",
                        "message": "Content generation timeout"
                    })),
                )
                    .into_response()
            }
            WebhookError::GenerationFailed(record) => {
                error!("Content generation via webhook failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "status": "error",
                        "message": "Content generation failed",
                        "record": record
                    })),
                )
                    .into_response()
            }
            WebhookError::InternalServerError(message) => {
                error!("Internal server error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "status": "error",
                        "message": "Internal server error"
                    })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_errors_map_to_status_codes() {
        assert_eq!(
            WebhookError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            WebhookError::Timeout.into_response().status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            WebhookError::GenerationFailed(None).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn timeout_message_reports_polls_and_seconds() {
        let err = PipelineError::Timeout {
            polls: 5,
            waited: Duration::from_secs(10),
        };
        assert_eq!(
            err.to_string(),
            "Job still running after 5 status checks (10s)"
        );
    }

    #[test]
    fn status_message_names_endpoint() {
        let err = PipelineError::Status {
            endpoint: "chat completions",
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert!(err.to_string().starts_with("chat completions returned 500"));
    }
}
