// Shared transport configuration for building reqwest::Client instances.
//
// Reads and writes carry different per-request timeouts: the device may
// need to process a write before it answers.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("thermopoll/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout for GETs.
    pub read_timeout: Duration,
    /// Per-request timeout for PUT/POST.
    pub write_timeout: Duration,
    /// TCP connect timeout, applied to every request.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No authentication headers are configured; the device has none.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))
    }

    pub(crate) fn read_timeout_ms(&self) -> u64 {
        duration_ms(self.read_timeout)
    }

    pub(crate) fn write_timeout_ms(&self) -> u64 {
        duration_ms(self.write_timeout)
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
