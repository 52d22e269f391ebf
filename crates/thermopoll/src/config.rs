//! CLI configuration: thin wrapper around `thermopoll_config` shared types.
//!
//! Adds device resolution that respects the `--device` and `--url`
//! overrides from `GlobalOpts`.

use thermopoll_core::{DeviceConfig, EngineConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use thermopoll_config::{
    Config, DeviceProfile, config_path, load_config, save_config,
};

/// Name given to a device built from `--url` alone.
pub const ADHOC_DEVICE: &str = "adhoc";

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the single device a command talks to.
///
/// `--url` wins over the configured URL. With `--url` and no matching
/// profile, an ad-hoc device is built from the configured defaults.
pub fn resolve_device(global: &GlobalOpts, cfg: &Config) -> Result<DeviceConfig, CliError> {
    if let Some(url) = global.url.as_deref() {
        let name = global.device.as_deref().unwrap_or(ADHOC_DEVICE);
        let mut profile = cfg
            .devices
            .get(name)
            .cloned()
            .unwrap_or_else(|| DeviceProfile::new(url));
        url.clone_into(&mut profile.url);
        return Ok(profile.to_device_config(name, &cfg.defaults)?);
    }

    if cfg.devices.is_empty() {
        return Err(no_config());
    }
    let name = cfg.resolve_device_name(global.device.as_deref())?;
    Ok(cfg.device_config(&name)?)
}

/// Engine settings for `watch`: the selected device when `--device` or
/// `--url` is given, every configured device otherwise.
pub fn resolve_engine(global: &GlobalOpts, cfg: &Config) -> Result<EngineConfig, CliError> {
    if global.device.is_some() || global.url.is_some() {
        let device = resolve_device(global, cfg)?;
        return Ok(cfg.defaults.engine_config(vec![device])?);
    }
    if cfg.devices.is_empty() {
        return Err(no_config());
    }
    Ok(cfg.engine_config()?)
}

fn no_config() -> CliError {
    CliError::NoConfig {
        path: config_path().display().to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["thermopoll"];
        argv.extend_from_slice(args);
        argv.push("info");
        Cli::try_parse_from(argv).unwrap().global
    }

    fn sample() -> Config {
        let mut cfg = Config::default();
        let mut garage = DeviceProfile::new("http://10.0.0.7");
        garage.timeout_read_ms = Some(900);
        cfg.devices.insert("garage".into(), garage);
        cfg.devices
            .insert("main".into(), DeviceProfile::new("http://10.0.0.5"));
        cfg
    }

    #[test]
    fn default_device_is_used_without_flags() {
        let device = resolve_device(&global(&[]), &sample()).unwrap();
        assert_eq!(device.id.as_str(), "main");
        assert_eq!(device.url.as_str(), "http://10.0.0.5/");
    }

    #[test]
    fn url_flag_overrides_profile_but_keeps_its_settings() {
        let device =
            resolve_device(&global(&["-d", "garage", "--url", "http://10.0.0.9"]), &sample())
                .unwrap();
        assert_eq!(device.id.as_str(), "garage");
        assert_eq!(device.url.host_str(), Some("10.0.0.9"));
        assert_eq!(device.client.transport.read_timeout.as_millis(), 900);
    }

    #[test]
    fn url_flag_without_config_builds_adhoc_device() {
        let device = resolve_device(&global(&["--url", "http://hp.local"]), &Config::default())
            .unwrap();
        assert_eq!(device.id.as_str(), ADHOC_DEVICE);
    }

    #[test]
    fn empty_config_without_url_is_no_config() {
        let err = resolve_device(&global(&[]), &Config::default()).unwrap_err();
        assert!(matches!(err, CliError::NoConfig { .. }));
    }

    #[test]
    fn watch_covers_all_devices_unless_one_is_selected() {
        let cfg = sample();
        assert_eq!(resolve_engine(&global(&[]), &cfg).unwrap().devices.len(), 2);
        let single = resolve_engine(&global(&["-d", "garage"]), &cfg).unwrap();
        assert_eq!(single.devices.len(), 1);
        assert_eq!(single.devices[0].id.as_str(), "garage");
    }
}
