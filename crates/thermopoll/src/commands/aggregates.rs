//! `thermopoll dashboard` and `thermopoll profile`

use serde::Serialize;

use thermopoll_api::{
    Dashboard, DashboardPatch, DeviceClient, DeviceStatus, ThermalProfile, ThermalProfilePatch,
};

use crate::cli::{DashboardArgs, DashboardCommand, GlobalOpts, ProfileArgs, ProfileCommand};
use crate::commands::util::detail;
use crate::error::CliError;
use crate::output::{self, opt_num};

fn nothing_to_set() -> CliError {
    CliError::Validation {
        field: "set".into(),
        reason: "pass at least one field to change".into(),
    }
}

// ── Dashboard ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DashboardView {
    #[serde(flatten)]
    dashboard: Dashboard,
    decoded_status: Option<DeviceStatus>,
}

pub async fn dashboard(
    client: &DeviceClient,
    args: DashboardArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command.unwrap_or(DashboardCommand::Show) {
        DashboardCommand::Show => {
            let dashboard: Dashboard = client.read_aggregate().await?;
            let view = DashboardView {
                decoded_status: dashboard.device_status(),
                dashboard,
            };
            let out = output::render_single(&global.output, &view, dashboard_detail, |v| {
                v.decoded_status
                    .map_or_else(|| "-".into(), |s| s.state.to_string())
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }
        DashboardCommand::Set {
            mode,
            room_setpoint,
            hot_water_setpoint,
        } => {
            let update = DashboardPatch {
                operating_mode: mode.into(),
                room_setpoint: room_setpoint.into(),
                hot_water_setpoint: hot_water_setpoint.into(),
            };
            if update == DashboardPatch::default() {
                return Err(nothing_to_set());
            }
            client.write_aggregate::<Dashboard>(&update).await?;
            if !global.quiet {
                eprintln!("Dashboard updated on {}", client.device_id());
            }
            Ok(())
        }
    }
}

fn dashboard_detail(v: &DashboardView) -> String {
    let d = &v.dashboard;
    let (state, compressor, defrost) = v.decoded_status.map_or_else(
        || ("-".to_owned(), "-".to_owned(), "-".to_owned()),
        |s| {
            (
                s.state.to_string(),
                s.compressor_running.to_string(),
                s.defrosting.to_string(),
            )
        },
    );
    detail(&[
        ("State", state),
        ("Compressor", compressor),
        ("Defrosting", defrost),
        ("Mode", d.operating_mode.map_or_else(|| "-".into(), |m| m.to_string())),
        ("Outdoor °C", opt_num(d.outdoor_temperature)),
        ("Flow °C", opt_num(d.flow_temperature)),
        ("Return °C", opt_num(d.return_temperature)),
        ("Room °C", opt_num(d.room_temperature)),
        ("Room setpoint", opt_num(d.room_setpoint)),
        ("Hot water °C", opt_num(d.hot_water_temperature)),
        ("Hot water setpoint", opt_num(d.hot_water_setpoint)),
        ("Power", opt_num(d.power_consumption)),
        ("Error code", d.error_code.map_or_else(|| "-".into(), |c| c.to_string())),
    ])
}

// ── Thermal profile ─────────────────────────────────────────────────

pub async fn profile(
    client: &DeviceClient,
    args: ProfileArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        ProfileCommand::Show => {
            let profile: ThermalProfile = client.read_aggregate().await?;
            let out = output::render_single(
                &global.output,
                &profile,
                |p| {
                    detail(&[
                        ("Comfort °C", opt_num(p.comfort_temperature)),
                        ("Eco °C", opt_num(p.eco_temperature)),
                        ("Frost protection °C", opt_num(p.frost_protection_temperature)),
                        ("Curve slope", opt_num(p.heating_curve_slope)),
                        ("Curve offset", opt_num(p.heating_curve_offset)),
                        (
                            "Schedule",
                            p.schedule_enabled
                                .map_or_else(|| "-".into(), |s| s.to_string()),
                        ),
                    ])
                },
                |p| opt_num(p.comfort_temperature),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
        ProfileCommand::Set {
            comfort,
            eco,
            frost_protection,
            curve_slope,
            curve_offset,
            schedule,
        } => {
            let update = ThermalProfilePatch {
                comfort_temperature: comfort.into(),
                eco_temperature: eco.into(),
                frost_protection_temperature: frost_protection.into(),
                heating_curve_slope: curve_slope.into(),
                heating_curve_offset: curve_offset.into(),
                schedule_enabled: schedule.into(),
            };
            if update == ThermalProfilePatch::default() {
                return Err(nothing_to_set());
            }
            client.write_aggregate::<ThermalProfile>(&update).await?;
            if !global.quiet {
                eprintln!("Thermal profile updated on {}", client.device_id());
            }
            Ok(())
        }
    }
}
