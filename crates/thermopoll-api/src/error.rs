use thiserror::Error;

/// Top-level error type for the `thermopoll-api` crate.
///
/// Covers every failure mode between a caller and the device: transport,
/// device-reported failures, caller validation, and engine lifecycle.
/// `thermopoll-core` maps these into user-facing diagnostics.
///
/// The type is `Clone` so that a single in-flight fetch can hand the same
/// failure to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket or DNS failure before a response arrived.
    #[error("Cannot reach device at {url}: {message}")]
    Connection { url: String, message: String },

    /// No response within the configured timeout.
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// HTTP client could not be built or the request could not be sent
    /// for a reason that is neither a connect nor a timeout failure.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Device ──────────────────────────────────────────────────────
    /// Non-2xx HTTP status with the device-supplied error body.
    #[error("Device error (HTTP {status}): {message}")]
    Device { status: u16, message: String },

    /// Transient failures persisted through every retry attempt.
    #[error("Device unreachable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    // ── Caller ──────────────────────────────────────────────────────
    /// Caller supplied an out-of-range byte count, value, scale or path.
    /// Raised before any network call is made.
    #[error("Validation failed: {0}")]
    Validation(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Lifecycle ───────────────────────────────────────────────────
    /// The in-flight request this caller was waiting on was cancelled.
    #[error("In-flight request was cancelled")]
    Cancelled,

    /// The gate has been closed and admits no new requests.
    #[error("Device client is shutting down")]
    ShuttingDown,
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Returns `true` for failures reported by (or about) the device itself
    /// rather than by the caller or the engine lifecycle.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Timeout { .. }
                | Self::Device { .. }
                | Self::RetriesExhausted { .. }
                | Self::Deserialization { .. }
        )
    }

    /// HTTP status reported by the device, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Device { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Classify a `reqwest` failure into the transport taxonomy.
    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout_ms: u64) -> Self {
        let url = err
            .url()
            .map_or_else(|| "<unknown>".into(), ToString::to_string);
        if err.is_timeout() {
            Self::Timeout { url, timeout_ms }
        } else if err.is_connect() || err.is_request() {
            Self::Connection {
                url,
                message: err.to_string(),
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_and_timeout_are_transient() {
        let conn = Error::Connection {
            url: "http://x".into(),
            message: "refused".into(),
        };
        let timeout = Error::Timeout {
            url: "http://x".into(),
            timeout_ms: 10,
        };
        assert!(conn.is_transient());
        assert!(timeout.is_transient());
        assert!(!Error::validation("bad").is_transient());
        assert!(
            !Error::Device {
                status: 404,
                message: "no such path".into()
            }
            .is_transient()
        );
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn exhausted_retries_expose_inner_status() {
        let err = Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(Error::Device {
                status: 503,
                message: "busy".into(),
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.is_device_failure());
        assert!(!Error::ShuttingDown.is_device_failure());
    }
}
