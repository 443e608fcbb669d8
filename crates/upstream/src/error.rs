//! Upstream client error taxonomy.

use std::error::Error as StdError;
use thiserror::Error;

/// Friendly classification of a transport failure, shown to users instead of
/// driver internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHint {
    Timeout,
    UnknownHost,
    ConnectionRefused,
    BadGateway,
}

impl TransportHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "connection timeout",
            Self::UnknownHost => "unknown host",
            Self::ConnectionRefused => "connection refused",
            Self::BadGateway => "bad gateway",
        }
    }
}

impl std::fmt::Display for TransportHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from the upstream catalog service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-2xx status. The body is kept verbatim
    /// so outer layers can forward it to the client.
    #[error("upstream error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        body: Vec<u8>,
    },

    /// The upstream was unreachable or too slow.
    #[error("upstream transport error: {hint}")]
    Transport { hint: TransportHint },

    /// A 2xx response that was not the JSON we asked for.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a 404 from the upstream.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        let hint = if err.is_timeout() {
            TransportHint::Timeout
        } else if err.is_connect() {
            // the resolver error is buried in the source chain; its message is
            // the only stable way to tell DNS failures apart
            let mut dns = false;
            let mut source: Option<&(dyn StdError + 'static)> = err.source();
            while let Some(cause) = source {
                let msg = cause.to_string();
                if msg.contains("dns") || msg.contains("resolve") {
                    dns = true;
                    break;
                }
                source = cause.source();
            }
            if dns {
                TransportHint::UnknownHost
            } else {
                TransportHint::ConnectionRefused
            }
        } else if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        } else {
            TransportHint::BadGateway
        };
        Self::Transport { hint }
    }
}

/// Result type for upstream operations.
pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;
