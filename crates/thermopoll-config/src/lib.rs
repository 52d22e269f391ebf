//! Shared configuration for the thermopoll CLI.
//!
//! TOML device profiles and polling defaults, loaded through figment
//! (defaults, then the config file, then `THERMOPOLL_` env vars), and
//! translation into `thermopoll_core::EngineConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use thermopoll_api::{
    ClientConfig, DecodeSpec, LimiterConfig, Resource, ResourceKind, RetryPolicy, TransportConfig,
};
use thermopoll_core::{DeviceConfig, EngineConfig, SensorConfig};

/// Env var that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "THERMOPOLL_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("device '{name}' is not configured")]
    UnknownDevice { name: String, available: Vec<String> },

    #[error("no device selected and no default_device configured")]
    NoDevice,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Device used when `--device` is not given.
    pub default_device: Option<String>,

    /// Global polling and transport defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named devices.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_device: Some("main".into()),
            defaults: Defaults::default(),
            devices: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Defaults {
    pub timeout_read_ms: u64,
    pub timeout_write_ms: u64,
    pub min_request_interval_ms: u64,
    pub write_cooldown_ms: u64,
    pub request_debounce_ms: u64,
    pub cache_ttl_ms: u64,
    pub retry_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub batch_interval_secs: u64,
    /// `0` disables aggregate polling.
    pub aggregate_interval_secs: u64,
    pub unavailable_after: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_read_ms: 5_000,
            timeout_write_ms: 15_000,
            min_request_interval_ms: 250,
            write_cooldown_ms: 2_000,
            request_debounce_ms: 500,
            cache_ttl_ms: 5_000,
            retry_attempts: 3,
            retry_initial_backoff_ms: 500,
            batch_interval_secs: 30,
            aggregate_interval_secs: 60,
            unavailable_after: 3,
        }
    }
}

/// A named device.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// Base URL (e.g., "http://192.168.1.50").
    pub url: String,

    /// Override `defaults.timeout_read_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_read_ms: Option<u64>,

    /// Override `defaults.timeout_write_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_write_ms: Option<u64>,

    /// Override `defaults.min_request_interval_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_request_interval_ms: Option<u64>,

    /// Data points polled by `watch`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<SensorEntry>,
}

/// One polled data point.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SensorEntry {
    pub kind: ResourceKind,
    /// Telemetry id (`"12"`) or property path (`"1.2.3"`).
    pub id: String,
    #[serde(default = "default_bytes")]
    pub bytes: u8,
    #[serde(default)]
    pub signed: bool,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_bytes() -> u8 {
    1
}
fn default_scale() -> f64 {
    1.0
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `THERMOPOLL_CONFIG` if set, else the
/// platform config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "thermopoll", "thermopoll").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("thermopoll");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from a specific file + environment. A missing file is not an error.
///
/// Env keys use `__` for nesting: `THERMOPOLL_DEFAULTS__BATCH_INTERVAL_SECS=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("THERMOPOLL_").split("__").ignore(&["config"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to runtime config ───────────────────────────────────

impl Config {
    /// Pick the device named on the command line, else `default_device`.
    pub fn resolve_device_name(&self, requested: Option<&str>) -> Result<String, ConfigError> {
        let name = requested
            .map(str::to_owned)
            .or_else(|| self.default_device.clone())
            .ok_or(ConfigError::NoDevice)?;
        if self.devices.contains_key(&name) {
            Ok(name)
        } else {
            Err(ConfigError::UnknownDevice {
                name,
                available: self.devices.keys().cloned().collect(),
            })
        }
    }

    /// Runtime settings for one named device.
    pub fn device_config(&self, name: &str) -> Result<DeviceConfig, ConfigError> {
        let profile = self
            .devices
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDevice {
                name: name.to_owned(),
                available: self.devices.keys().cloned().collect(),
            })?;
        profile.to_device_config(name, &self.defaults)
    }

    /// Engine settings covering every configured device.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let devices = self
            .devices
            .keys()
            .map(|name| self.device_config(name))
            .collect::<Result<Vec<_>, _>>()?;
        self.defaults.engine_config(devices)
    }
}

impl Defaults {
    /// Client settings with the defaults applied.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            transport: TransportConfig {
                read_timeout: Duration::from_millis(self.timeout_read_ms),
                write_timeout: Duration::from_millis(self.timeout_write_ms),
                ..TransportConfig::default()
            },
            limiter: LimiterConfig {
                min_request_interval: Duration::from_millis(self.min_request_interval_ms),
                write_cooldown: Duration::from_millis(self.write_cooldown_ms),
                request_debounce: Duration::from_millis(self.request_debounce_ms),
            },
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
                ..RetryPolicy::default()
            },
            cache_ttl: Duration::from_millis(self.cache_ttl_ms),
        }
    }

    pub fn engine_config(&self, devices: Vec<DeviceConfig>) -> Result<EngineConfig, ConfigError> {
        if self.batch_interval_secs == 0 {
            return Err(invalid("defaults.batch_interval_secs", "must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("defaults.retry_attempts", "must be at least 1"));
        }
        Ok(EngineConfig {
            devices,
            batch_interval: Duration::from_secs(self.batch_interval_secs),
            aggregate_interval: Duration::from_secs(self.aggregate_interval_secs),
            unavailable_after: self.unavailable_after.max(1),
            ..EngineConfig::default()
        })
    }
}

impl DeviceProfile {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_read_ms: None,
            timeout_write_ms: None,
            min_request_interval_ms: None,
            sensors: Vec::new(),
        }
    }

    pub fn to_device_config(
        &self,
        name: &str,
        defaults: &Defaults,
    ) -> Result<DeviceConfig, ConfigError> {
        let url: url::Url = self.url.parse().map_err(|_| {
            invalid(
                format!("devices.{name}.url"),
                format!("invalid URL: {}", self.url),
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(
                format!("devices.{name}.url"),
                format!("expected an http(s) URL, got '{}'", self.url),
            ));
        }

        let mut client = defaults.client_config();
        if let Some(ms) = self.timeout_read_ms {
            client.transport.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.timeout_write_ms {
            client.transport.write_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.min_request_interval_ms {
            client.limiter.min_request_interval = Duration::from_millis(ms);
        }

        let sensors = self
            .sensors
            .iter()
            .enumerate()
            .map(|(i, s)| s.to_sensor_config(&format!("devices.{name}.sensors[{i}]")))
            .collect::<Result<Vec<_>, _>>()?;

        let mut device = DeviceConfig::new(name, url);
        device.client = client;
        device.sensors = sensors;
        Ok(device)
    }
}

impl SensorEntry {
    pub fn to_sensor_config(&self, field: &str) -> Result<SensorConfig, ConfigError> {
        let resource = Resource::parse(self.kind, &self.id)
            .map_err(|e| invalid(format!("{field}.id"), e.to_string()))?;
        let bad_key = if matches!(self.bytes, 1 | 2) { "scale" } else { "bytes" };
        let spec = DecodeSpec::new(self.bytes, self.signed, self.scale)
            .map_err(|e| invalid(format!("{field}.{bad_key}"), e.to_string()))?;
        Ok(SensorConfig { resource, spec })
    }
}
