//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use thermopoll_config::ConfigError;
use thermopoll_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to device at {url}")]
    #[diagnostic(
        code(thermopoll::connection_failed),
        help(
            "Check that the device is powered and reachable on the local network.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Device did not respond after {attempts} attempts")]
    #[diagnostic(
        code(thermopoll::unreachable),
        help("Last failure: {reason}")
    )]
    Unreachable { attempts: u32, reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(thermopoll::timeout),
        help("Raise defaults.timeout_read_ms / timeout_write_ms or check device load.")
    )]
    Timeout { timeout_ms: u64 },

    // ── Device ───────────────────────────────────────────────────────

    #[error("Device rejected the request (HTTP {status}): {message}")]
    #[diagnostic(code(thermopoll::device_error))]
    DeviceRejected { status: u16, message: String },

    #[error("Unexpected response from device: {message}")]
    #[diagnostic(code(thermopoll::invalid_response))]
    InvalidResponse { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(thermopoll::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Device '{name}' not found in configuration")]
    #[diagnostic(
        code(thermopoll::device_not_found),
        help(
            "Available devices: {available}\n\
             Add one with: thermopoll config init --name {name} --device-url <URL>"
        )
    )]
    DeviceNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(thermopoll::no_config),
        help(
            "Create one with: thermopoll config init\n\
             Or pass --url for a one-off request.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(thermopoll::config))]
    Config(Box<figment::Error>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(thermopoll::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    #[error("Operation cancelled")]
    #[diagnostic(code(thermopoll::cancelled))]
    Cancelled,

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to write config: {0}")]
    #[diagnostic(code(thermopoll::config_write))]
    ConfigWrite(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::DeviceRejected { status: 404, .. } | Self::DeviceNotFound { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            CoreError::Unreachable { attempts, reason } => Self::Unreachable { attempts, reason },
            CoreError::Rejected { status, message } => Self::DeviceRejected { status, message },
            CoreError::InvalidResponse { message } => Self::InvalidResponse { message },
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::UnknownDevice { device } => Self::DeviceNotFound {
                name: device,
                available: String::new(),
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Cancelled | CoreError::ShuttingDown => Self::Cancelled,
        }
    }
}

impl From<thermopoll_api::Error> for CliError {
    fn from(err: thermopoll_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownDevice { name, available } => Self::DeviceNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::NoDevice => Self::NoConfig {
                path: thermopoll_config::config_path().display().to_string(),
            },
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Serialization(e) => Self::ConfigWrite(e.to_string()),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}
