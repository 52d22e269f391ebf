//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::Input;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::commands::util::prompt_err;
use crate::config::{self, Config, DeviceProfile};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct DeviceEntry {
    name: String,
    url: String,
    sensors: usize,
    default: bool,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Sensors")]
    sensors: usize,
}

fn device_entries(cfg: &Config) -> Vec<DeviceEntry> {
    cfg.devices
        .iter()
        .map(|(name, profile)| DeviceEntry {
            name: name.clone(),
            url: profile.url.clone(),
            sensors: profile.sensors.len(),
            default: cfg.default_device.as_deref() == Some(name.as_str()),
        })
        .collect()
}

/// Ask for the device URL when it was not given on the command line.
fn prompt_url() -> Result<String, CliError> {
    if !std::io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: "device-url".into(),
            reason: "required when not running interactively".into(),
        });
    }
    Input::new()
        .with_prompt("Device URL")
        .default("http://192.168.1.50".to_owned())
        .interact_text()
        .map_err(prompt_err)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config()?;
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&cfg)
                    .map_err(|e| CliError::ConfigWrite(e.to_string()))?,
                ref format => {
                    output::render_single(format, &cfg, |_| String::new(), |_| String::new())
                }
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            name,
            device_url,
            force,
        } => {
            let mut cfg = config::load_config()?;
            let name = name
                .or_else(|| global.device.clone())
                .unwrap_or_else(|| "main".into());
            if cfg.devices.contains_key(&name) && !force {
                return Err(CliError::Validation {
                    field: "name".into(),
                    reason: format!("device '{name}' already exists (use --force to replace it)"),
                });
            }
            let url = device_url
                .or_else(|| global.url.clone())
                .map_or_else(prompt_url, Ok)?;

            let profile = DeviceProfile::new(url);
            // Reject a bad URL before anything is written.
            profile.to_device_config(&name, &cfg.defaults)?;
            cfg.devices.insert(name.clone(), profile);
            if !cfg
                .default_device
                .as_ref()
                .is_some_and(|d| cfg.devices.contains_key(d))
            {
                cfg.default_device = Some(name.clone());
            }

            let path = config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Saved device '{name}' to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::Devices => {
            let cfg = config::load_config()?;
            let entries = device_entries(&cfg);
            let out = output::render_list(
                &global.output,
                &entries,
                |e| DeviceRow {
                    marker: if e.default { "*" } else { "" },
                    name: e.name.clone(),
                    url: e.url.clone(),
                    sensors: e.sensors,
                },
                |e| e.name.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            if !cfg.devices.contains_key(&name) {
                return Err(CliError::DeviceNotFound {
                    available: cfg.devices.keys().cloned().collect::<Vec<_>>().join(", "),
                    name,
                });
            }
            cfg.default_device = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default device set to '{name}'");
            }
            Ok(())
        }
    }
}
