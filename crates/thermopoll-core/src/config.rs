// ── Runtime engine configuration ──
//
// These types describe which devices to poll and how. They never touch
// disk: the CLI (via thermopoll-config) builds an `EngineConfig` and hands
// it in.

use std::time::Duration;

use thermopoll_api::{ClientConfig, DecodeSpec, DeviceId, Resource};
use url::Url;

/// One data point polled on every batch cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorConfig {
    pub resource: Resource,
    pub spec: DecodeSpec,
}

/// Connection and polling settings for a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub id: DeviceId,
    /// Base URL, e.g. `http://192.168.1.50`.
    pub url: Url,
    pub client: ClientConfig,
    /// Sensors subscribed when the engine starts.
    pub sensors: Vec<SensorConfig>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<DeviceId>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            client: ClientConfig::default(),
            sensors: Vec::new(),
        }
    }
}

/// Everything the [`Engine`](crate::Engine) needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub devices: Vec<DeviceConfig>,
    /// Batch refresh period.
    pub batch_interval: Duration,
    /// Aggregate refresh period. `Duration::ZERO` disables aggregate polling.
    pub aggregate_interval: Duration,
    /// Consecutive failures before a snapshot is flagged unavailable.
    pub unavailable_after: u32,
    /// Upper bound on concurrent reads per batch cycle.
    pub max_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            batch_interval: Duration::from_secs(30),
            aggregate_interval: Duration::from_secs(60),
            unavailable_after: 3,
            max_concurrency: 8,
        }
    }
}
