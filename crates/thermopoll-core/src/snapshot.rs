// ── Result snapshots ──
//
// The last known state of one polled data point. Written only by the
// batch coordinator; read by anyone through `BatchCoordinator::latest`.

use chrono::{DateTime, Utc};
use thermopoll_api::{DeviceId, Reading, Resource};

use crate::error::CoreError;

/// Latest decoded value of one `(device, resource)` plus its health.
///
/// A failure never erases `value`: consumers keep seeing the last good
/// reading, with `last_error` and `unavailable` telling them how stale it is.
#[derive(Debug, Clone)]
pub struct ResultSnapshot {
    pub device_id: DeviceId,
    pub resource: Resource,
    pub value: Option<f64>,
    pub raw: Vec<u8>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_error: Option<CoreError>,
    pub consecutive_failures: u32,
    pub unavailable: bool,
}

impl ResultSnapshot {
    pub fn new(device_id: DeviceId, resource: Resource) -> Self {
        Self {
            device_id,
            resource,
            value: None,
            raw: Vec::new(),
            last_success_time: None,
            last_error: None,
            consecutive_failures: 0,
            unavailable: false,
        }
    }

    pub(crate) fn record_success(&mut self, reading: Reading, at: DateTime<Utc>) {
        self.value = Some(reading.value);
        self.raw = reading.raw;
        self.last_success_time = Some(at);
        self.last_error = None;
        self.consecutive_failures = 0;
        self.unavailable = false;
    }

    pub(crate) fn record_failure(&mut self, error: CoreError, unavailable_after: u32) {
        self.last_error = Some(error);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= unavailable_after.max(1) {
            self.unavailable = true;
        }
    }

    /// `true` once at least one read succeeded.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(value: f64) -> Reading {
        Reading {
            raw: vec![1, 2],
            value,
        }
    }

    fn failure() -> CoreError {
        CoreError::Timeout { timeout_ms: 5000 }
    }

    #[test]
    fn failures_keep_last_good_value_until_threshold() {
        let mut snap = ResultSnapshot::new(DeviceId::from("main"), Resource::Telemetry(1));
        snap.record_success(reading(21.5), Utc::now());

        snap.record_failure(failure(), 3);
        snap.record_failure(failure(), 3);
        assert_eq!(snap.value, Some(21.5));
        assert_eq!(snap.consecutive_failures, 2);
        assert!(!snap.unavailable);
        assert!(snap.last_error.is_some());

        snap.record_failure(failure(), 3);
        assert!(snap.unavailable);
        assert_eq!(snap.value, Some(21.5), "value is kept even when unavailable");
    }

    #[test]
    fn success_clears_failure_state() {
        let mut snap = ResultSnapshot::new(DeviceId::from("main"), Resource::Telemetry(1));
        for _ in 0..4 {
            snap.record_failure(failure(), 3);
        }
        assert!(snap.unavailable);
        assert!(!snap.has_value());

        snap.record_success(reading(19.0), Utc::now());
        assert!(!snap.unavailable);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.last_error.is_none());
        assert_eq!(snap.raw, vec![1, 2]);
    }

    #[test]
    fn zero_threshold_behaves_like_one() {
        let mut snap = ResultSnapshot::new(DeviceId::from("main"), Resource::Telemetry(1));
        snap.record_failure(failure(), 0);
        assert!(snap.unavailable);
    }
}
