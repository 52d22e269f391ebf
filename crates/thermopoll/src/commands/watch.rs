//! `thermopoll watch`: run the batch engine and print every cycle.

use std::time::Duration;

use serde::Serialize;
use tabled::Tabled;

use thermopoll_api::{DecodeSpec, Resource};
use thermopoll_core::{Engine, EngineConfig, ResultSnapshot, SensorConfig};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SnapshotView {
    device: String,
    resource: String,
    value: Option<f64>,
    raw: Vec<u8>,
    last_success: Option<String>,
    consecutive_failures: u32,
    unavailable: bool,
    last_error: Option<String>,
}

impl From<&ResultSnapshot> for SnapshotView {
    fn from(s: &ResultSnapshot) -> Self {
        Self {
            device: s.device_id.to_string(),
            resource: s.resource.to_string(),
            value: s.value,
            raw: s.raw.clone(),
            last_success: s.last_success_time.map(|t| t.to_rfc3339()),
            consecutive_failures: s.consecutive_failures,
            unavailable: s.unavailable,
            last_error: s.last_error.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Raw")]
    raw: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Last error")]
    error: String,
}

/// Apply the `watch` flags on top of the configured engine settings.
fn apply_overrides(mut config: EngineConfig, args: &WatchArgs) -> Result<EngineConfig, CliError> {
    if let Some(secs) = args.interval {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        config.batch_interval = Duration::from_secs(secs);
    }
    for device in &mut config.devices {
        device
            .sensors
            .extend(args.telemetry.iter().map(|&id| SensorConfig {
                resource: Resource::Telemetry(id),
                spec: DecodeSpec::raw_u8(),
            }));
    }
    if config.devices.iter().all(|d| d.sensors.is_empty()) {
        return Err(CliError::Validation {
            field: "sensors".into(),
            reason: "nothing to poll: add sensors to the device config or pass --telemetry"
                .into(),
        });
    }
    // Aggregate documents are not shown here.
    config.aggregate_interval = Duration::ZERO;
    Ok(config)
}

pub async fn handle(
    config: EngineConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let config = apply_overrides(config, &args)?;
    let color = output::should_color(&global.color);

    let engine = Engine::new(config)?;
    let mut cycles = engine.batch().subscribe_cycles();
    engine.start().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut seen = 0_u64;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            changed = cycles.changed() => {
                if changed.is_err() {
                    break;
                }
                let views: Vec<SnapshotView> =
                    engine.batch().snapshots().iter().map(SnapshotView::from).collect();
                let out = output::render_list(
                    &global.output,
                    &views,
                    |v| SnapshotRow {
                        device: v.device.clone(),
                        resource: v.resource.clone(),
                        value: output::opt_num(v.value),
                        raw: output::hex_bytes(&v.raw),
                        health: output::health(v.unavailable, v.consecutive_failures > 0, color),
                        error: v.last_error.clone().unwrap_or_default(),
                    },
                    |v| format!("{} {} {}", v.device, v.resource, output::opt_num(v.value)),
                );
                output::print_output(&out, global.quiet);

                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use thermopoll_core::DeviceConfig;

    use super::*;

    fn args(interval: Option<u64>, telemetry: Vec<u16>) -> WatchArgs {
        WatchArgs {
            interval,
            count: None,
            telemetry,
        }
    }

    fn base() -> EngineConfig {
        EngineConfig {
            devices: vec![DeviceConfig::new("main", "http://hp.local".parse().unwrap())],
            ..EngineConfig::default()
        }
    }

    #[test]
    fn telemetry_flag_adds_raw_sensors() {
        let config = apply_overrides(base(), &args(Some(5), vec![12, 13])).unwrap();
        assert_eq!(config.batch_interval, Duration::from_secs(5));
        assert_eq!(config.aggregate_interval, Duration::ZERO);
        let sensors = &config.devices[0].sensors;
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[1].resource, Resource::Telemetry(13));
    }

    #[test]
    fn nothing_to_poll_is_rejected() {
        let err = apply_overrides(base(), &args(None, vec![])).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "sensors"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = apply_overrides(base(), &args(Some(0), vec![1])).unwrap_err();
        assert!(matches!(err, CliError::Validation { ref field, .. } if field == "interval"));
    }
}
