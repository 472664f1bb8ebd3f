//! Typed errors for the ingestion and chat pipelines.
//!
//! Every call that crosses a process boundary (embedding service, vector
//! index, chat model, filesystem) returns [`RagError`]. Callers that need to
//! decide between retrying and giving up inspect [`RagError::kind`] or
//! [`RagError::is_retryable`] instead of matching on message text.
//!
//! The binary uses `anyhow` on top of these for command-level context.

use serde::Serialize;
use thiserror::Error;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Coarse error classification surfaced to HTTP clients and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, DNS failure, timeout.
    Network,
    /// The upstream answered but the body was not what we expected.
    Parse,
    /// HTTP 429 from an upstream service.
    UpstreamQuota,
    /// Any other non-success HTTP status from an upstream service.
    Upstream,
    /// Missing API key, invalid setting.
    Config,
    /// Local filesystem failure.
    Io,
    /// Text could not be extracted from a document.
    Extract,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Parse => "parse",
            ErrorKind::UpstreamQuota => "upstream_quota",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
            ErrorKind::Extract => "extract",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("network error calling {service}: {message}")]
    Network { service: &'static str, message: String },

    #[error("{service} quota exceeded (HTTP 429): {body}")]
    Quota { service: &'static str, body: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("malformed response from {service}: {message}")]
    Parse { service: &'static str, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("text extraction failed for {path}: {message}")]
    Extract { path: String, message: String },
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::Network { .. } => ErrorKind::Network,
            RagError::Quota { .. } => ErrorKind::UpstreamQuota,
            RagError::Upstream { .. } => ErrorKind::Upstream,
            RagError::Parse { .. } => ErrorKind::Parse,
            RagError::Config(_) => ErrorKind::Config,
            RagError::Io(_) => ErrorKind::Io,
            RagError::Extract { .. } => ErrorKind::Extract,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Network failures, rate limits and 5xx answers are transient; client
    /// errors, malformed bodies and local failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::Network { .. } | RagError::Quota { .. } => true,
            RagError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn parse(service: &'static str, message: impl Into<String>) -> Self {
        RagError::Parse {
            service,
            message: message.into(),
        }
    }

    /// Classify a `reqwest` failure. Body decode failures are parse errors,
    /// everything else is treated as a transport problem.
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            RagError::Parse {
                service,
                message: err.to_string(),
            }
        } else {
            RagError::Network {
                service,
                message: err.to_string(),
            }
        }
    }

    /// Build the error for a non-success HTTP status.
    pub fn from_status(service: &'static str, status: u16, body: String) -> Self {
        if status == 429 {
            RagError::Quota { service, body }
        } else {
            RagError::Upstream {
                service,
                status,
                body,
            }
        }
    }
}

/// Turn a response into its JSON body, mapping non-2xx statuses and decode
/// failures onto [`RagError`].
pub async fn json_or_error(
    service: &'static str,
    response: reqwest::Response,
) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::from_status(service, status.as_u16(), body));
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| RagError::from_reqwest(service, e))
}
