//! Error taxonomy for outbound service requests.

use reqwest::StatusCode;
use thiserror::Error;

/// Detail used when a 4xx body carries no `message`.
pub const DEFAULT_CLIENT_DETAIL: &str = "Invalid request format";

/// Fixed detail for 5xx responses. Upstream bodies are never surfaced.
pub const UPSTREAM_SERVER_DETAIL: &str = "Upstream service error";

/// Failure of a single `make_request` call.
#[derive(Debug, Error)]
pub enum RequestError {
    /// HTTP 4xx with a JSON body. `detail` is the body's `message` field.
    #[error("{}", .detail.as_deref().unwrap_or(DEFAULT_CLIENT_DETAIL))]
    ClientRequest {
        status: StatusCode,
        detail: Option<String>,
    },

    /// HTTP 4xx whose body is not JSON.
    #[error("HTTP {} error", .status.as_u16())]
    UnparsableClientError { status: StatusCode },

    /// HTTP 5xx, body discarded.
    #[error("{}", UPSTREAM_SERVER_DETAIL)]
    UpstreamServer { status: StatusCode },

    /// Connection, DNS, timeout or body read failure.
    #[error("Failed to reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint could not be resolved against the base URL.
    #[error("Invalid endpoint {endpoint:?}: {source}")]
    InvalidUrl {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
}

impl RequestError {
    /// Upstream status code, when the failure came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RequestError::ClientRequest { status, .. }
            | RequestError::UnparsableClientError { status }
            | RequestError::UpstreamServer { status } => Some(*status),
            RequestError::Transport { source, .. } => source.status(),
            RequestError::InvalidUrl { .. } => None,
        }
    }

    /// Detail message carried by a client error, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            RequestError::ClientRequest { detail, .. } => detail.as_deref(),
            RequestError::UpstreamServer { .. } => Some(UPSTREAM_SERVER_DETAIL),
            _ => None,
        }
    }

    /// Whether a later attempt of the same request could succeed.
    /// Client errors fail fast; server and transport failures are transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RequestError::UpstreamServer { .. } | RequestError::Transport { .. }
        )
    }

    /// Status an HTTP front end should answer with for this failure.
    pub fn http_status(&self) -> StatusCode {
        match self {
            RequestError::ClientRequest { .. }
            | RequestError::UnparsableClientError { .. }
            | RequestError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            RequestError::UpstreamServer { .. } | RequestError::Transport { .. } => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}
