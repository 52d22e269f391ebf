// ── Core error types ──
//
// User-facing errors from thermopoll-core. Consumers never match on raw
// HTTP details; the `From<thermopoll_api::Error>` impl folds transport
// and device failures into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
///
/// `Clone` so snapshots can keep the last failure next to the last good
/// value.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Reachability ─────────────────────────────────────────────────
    #[error("Cannot connect to device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device unreachable after {attempts} attempts: {reason}")]
    Unreachable { attempts: u32, reason: String },

    // ── Device-reported ──────────────────────────────────────────────
    #[error("Device rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected device response: {message}")]
    InvalidResponse { message: String },

    // ── Caller ───────────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Unknown device: {device} (not configured)")]
    UnknownDevice { device: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Request cancelled")]
    Cancelled,

    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl CoreError {
    /// `true` when the failure says something about the device's health
    /// rather than about the caller or the engine lifecycle.
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
                | Self::Unreachable { .. }
                | Self::Rejected { .. }
                | Self::InvalidResponse { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<thermopoll_api::Error> for CoreError {
    fn from(err: thermopoll_api::Error) -> Self {
        use thermopoll_api::Error as Api;
        match err {
            Api::Connection { url, message } => Self::ConnectionFailed {
                url,
                reason: message,
            },
            Api::Timeout { timeout_ms, .. } => Self::Timeout { timeout_ms },
            Api::Transport(reason) => Self::ConnectionFailed {
                url: String::new(),
                reason,
            },
            Api::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Device { status, message } => Self::Rejected { status, message },
            Api::RetriesExhausted { attempts, last } => Self::Unreachable {
                attempts,
                reason: last.to_string(),
            },
            Api::Validation(message) => Self::ValidationFailed { message },
            Api::Deserialization { message, .. } => Self::InvalidResponse { message },
            Api::Cancelled => Self::Cancelled,
            Api::ShuttingDown => Self::ShuttingDown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_keep_status() {
        let err = CoreError::from(thermopoll_api::Error::Device {
            status: 503,
            message: "busy".into(),
        });
        assert!(matches!(err, CoreError::Rejected { status: 503, .. }));
        assert!(err.is_device_failure());
    }

    #[test]
    fn exhausted_retries_name_the_last_failure() {
        let err = CoreError::from(thermopoll_api::Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(thermopoll_api::Error::Timeout {
                url: "http://hp/api/info".into(),
                timeout_ms: 5000,
            }),
        });
        let CoreError::Unreachable { attempts, reason } = err else {
            panic!("expected Unreachable");
        };
        assert_eq!(attempts, 3);
        assert!(reason.contains("5000ms"));
    }

    #[test]
    fn lifecycle_errors_are_not_device_failures() {
        assert!(!CoreError::from(thermopoll_api::Error::ShuttingDown).is_device_failure());
        assert!(!CoreError::from(thermopoll_api::Error::Validation("x".into())).is_device_failure());
    }
}
