//! Whole-document resources.
//!
//! Some data lives in JSON documents behind a single GET/PUT endpoint rather
//! than in individually addressed data points. Each document is a typed
//! record with one field per known wire key; unknown keys are kept in
//! `extra` so nothing the device sends is silently dropped.
//!
//! Writes use a companion patch record whose fields are [`Patch<T>`]. Every
//! patch field is always serialized: `Unchanged` becomes an explicit `null`
//! which the device reads as "leave as is".

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use strum::Display;

/// One field of a partial update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Patch<T> {
    /// Sent as `null`; the device keeps its current value.
    #[default]
    Unchanged,
    /// Sent as the new value.
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Overwrite `target` if this field is set.
    pub fn apply_to(&self, target: &mut Option<T>)
    where
        T: Clone,
    {
        if let Self::Set(v) = self {
            *target = Some(v.clone());
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unchanged, Self::Set)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unchanged => serializer.serialize_none(),
            Self::Set(v) => serializer.serialize_some(v),
        }
    }
}

/// A whole-document resource exposed by the device.
pub trait Aggregate: DeserializeOwned + Serialize + Clone + Debug + Send + Sync + 'static {
    /// Path segment under `/api/{serial}/`.
    const RESOURCE: &'static str;

    /// Partial update carrying every writable field.
    type Patch: Serialize + Default + Clone + Debug + Send + Sync + 'static;

    /// Apply a patch locally (optimistic update after a successful write).
    fn apply(&mut self, patch: &Self::Patch);
}

// ── Dashboard ───────────────────────────────────────────────────────

/// Live overview document: temperatures, setpoints and status word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dashboard {
    pub status: Option<u16>,
    pub operating_mode: Option<u8>,
    pub outdoor_temperature: Option<f64>,
    pub flow_temperature: Option<f64>,
    pub return_temperature: Option<f64>,
    pub hot_water_temperature: Option<f64>,
    pub room_temperature: Option<f64>,
    pub room_setpoint: Option<f64>,
    pub hot_water_setpoint: Option<f64>,
    pub power_consumption: Option<f64>,
    pub error_code: Option<u16>,
    /// Keys this version does not know about.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Writable subset of [`Dashboard`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardPatch {
    pub operating_mode: Patch<u8>,
    pub room_setpoint: Patch<f64>,
    pub hot_water_setpoint: Patch<f64>,
}

impl Aggregate for Dashboard {
    const RESOURCE: &'static str = "dashboard";
    type Patch = DashboardPatch;

    fn apply(&mut self, patch: &DashboardPatch) {
        patch.operating_mode.apply_to(&mut self.operating_mode);
        patch.room_setpoint.apply_to(&mut self.room_setpoint);
        patch.hot_water_setpoint.apply_to(&mut self.hot_water_setpoint);
    }
}

impl Dashboard {
    /// Decoded status word, if the device reported one.
    pub fn device_status(&self) -> Option<DeviceStatus> {
        self.status.map(DeviceStatus::from_bits)
    }
}

// ── Thermal profile ─────────────────────────────────────────────────

/// Heating curve and comfort/eco setpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalProfile {
    pub comfort_temperature: Option<f64>,
    pub eco_temperature: Option<f64>,
    pub frost_protection_temperature: Option<f64>,
    pub heating_curve_slope: Option<f64>,
    pub heating_curve_offset: Option<f64>,
    pub schedule_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThermalProfilePatch {
    pub comfort_temperature: Patch<f64>,
    pub eco_temperature: Patch<f64>,
    pub frost_protection_temperature: Patch<f64>,
    pub heating_curve_slope: Patch<f64>,
    pub heating_curve_offset: Patch<f64>,
    pub schedule_enabled: Patch<bool>,
}

impl Aggregate for ThermalProfile {
    const RESOURCE: &'static str = "thermal-profile";
    type Patch = ThermalProfilePatch;

    fn apply(&mut self, patch: &ThermalProfilePatch) {
        patch.comfort_temperature.apply_to(&mut self.comfort_temperature);
        patch.eco_temperature.apply_to(&mut self.eco_temperature);
        patch
            .frost_protection_temperature
            .apply_to(&mut self.frost_protection_temperature);
        patch.heating_curve_slope.apply_to(&mut self.heating_curve_slope);
        patch
            .heating_curve_offset
            .apply_to(&mut self.heating_curve_offset);
        patch.schedule_enabled.apply_to(&mut self.schedule_enabled);
    }
}

// ── Status word ─────────────────────────────────────────────────────

const BIT_HEATING: u16 = 0x0001;
const BIT_COOLING: u16 = 0x0002;
const BIT_HOT_WATER: u16 = 0x0004;
const BIT_COMPRESSOR: u16 = 0x0010;
const BIT_DEFROST: u16 = 0x0020;

/// What the unit is doing, from the documented mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OperatingState {
    Standby,
    Heating,
    Cooling,
    HotWater,
}

/// Decoded dashboard status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub state: OperatingState,
    pub compressor_running: bool,
    /// Best-effort heuristic. The defrost bit and the "heating and cooling
    /// at once" reverse-cycle pattern were observed on real units but are
    /// not documented by the vendor.
    pub defrosting: bool,
}

impl DeviceStatus {
    pub fn from_bits(bits: u16) -> Self {
        let state = if bits & BIT_HOT_WATER != 0 {
            OperatingState::HotWater
        } else if bits & BIT_HEATING != 0 {
            OperatingState::Heating
        } else if bits & BIT_COOLING != 0 {
            OperatingState::Cooling
        } else {
            OperatingState::Standby
        };
        let reverse_cycle = bits & (BIT_HEATING | BIT_COOLING) == BIT_HEATING | BIT_COOLING;
        Self {
            state,
            compressor_running: bits & BIT_COMPRESSOR != 0,
            defrosting: bits & BIT_DEFROST != 0 || reverse_cycle,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn patch_serializes_every_field_with_explicit_nulls() {
        let patch = ThermalProfilePatch {
            comfort_temperature: Patch::Set(21.5),
            ..ThermalProfilePatch::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({
                "comfort_temperature": 21.5,
                "eco_temperature": null,
                "frost_protection_temperature": null,
                "heating_curve_slope": null,
                "heating_curve_offset": null,
                "schedule_enabled": null,
            })
        );
    }

    #[test]
    fn dashboard_keeps_unknown_keys() {
        let dash: Dashboard = serde_json::from_value(json!({
            "status": 5,
            "outdoor_temperature": -3.5,
            "firmware_build": "r1234"
        }))
        .unwrap();
        assert_eq!(dash.status, Some(5));
        assert_eq!(dash.outdoor_temperature, Some(-3.5));
        assert_eq!(dash.flow_temperature, None);
        assert_eq!(dash.extra.get("firmware_build"), Some(&json!("r1234")));
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut profile = ThermalProfile {
            comfort_temperature: Some(20.0),
            eco_temperature: Some(17.0),
            ..ThermalProfile::default()
        };
        profile.apply(&ThermalProfilePatch {
            eco_temperature: Patch::Set(16.0),
            schedule_enabled: Patch::Set(true),
            ..ThermalProfilePatch::default()
        });
        assert_eq!(profile.comfort_temperature, Some(20.0));
        assert_eq!(profile.eco_temperature, Some(16.0));
        assert_eq!(profile.schedule_enabled, Some(true));
    }

    #[test]
    fn patch_from_option() {
        assert_eq!(Patch::from(Some(3u8)), Patch::Set(3));
        assert_eq!(Patch::<u8>::from(None), Patch::Unchanged);
        assert!(!Patch::<u8>::Unchanged.is_set());
    }

    #[test]
    fn documented_mode_bits() {
        assert_eq!(DeviceStatus::from_bits(0).state, OperatingState::Standby);
        assert_eq!(DeviceStatus::from_bits(0x01).state, OperatingState::Heating);
        assert_eq!(DeviceStatus::from_bits(0x02).state, OperatingState::Cooling);
        assert_eq!(DeviceStatus::from_bits(0x05).state, OperatingState::HotWater);
        assert!(DeviceStatus::from_bits(0x11).compressor_running);
        assert!(!DeviceStatus::from_bits(0x01).defrosting);
    }

    // Heuristic: these patterns were observed, not specified.
    #[test]
    fn defrost_heuristic_patterns() {
        assert!(DeviceStatus::from_bits(0x21).defrosting);
        assert!(DeviceStatus::from_bits(0x13).defrosting);
        assert_eq!(DeviceStatus::from_bits(0x13).state, OperatingState::Heating);
    }
}
