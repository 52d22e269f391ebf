// ── Request registry ──
//
// Per-device table of data points somebody currently cares about. Many
// subscriptions to the same `(device, resource)` collapse into one key,
// so the batch coordinator issues one read per key per cycle.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thermopoll_api::{DecodeSpec, DeviceId, Resource};
use tracing::{debug, warn};

/// Opaque token returned by [`RequestRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

/// A single distinct read, as handed to the batch coordinator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadRequest {
    pub resource: Resource,
    pub spec: DecodeSpec,
}

#[derive(Debug)]
struct KeyEntry {
    spec: DecodeSpec,
    handles: BTreeSet<SubscriptionHandle>,
}

#[derive(Debug)]
struct HandleEntry {
    key: (DeviceId, Resource),
    spec: DecodeSpec,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_handle: u64,
    // BTreeMap keeps drains in a stable order for logs and tests.
    keys: BTreeMap<(DeviceId, Resource), KeyEntry>,
    // Each handle keeps the spec it asked for, so the key spec can be
    // re-derived when the subscriber that set it leaves.
    handles: HashMap<SubscriptionHandle, HandleEntry>,
}

/// Deduplicating table of live subscriptions.
#[derive(Debug, Default)]
pub struct RequestRegistry {
    inner: Mutex<RegistryInner>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in one data point.
    ///
    /// If the key is already registered with a different decode spec, the
    /// earliest live subscriber's spec wins and a warning is logged.
    pub fn subscribe(
        &self,
        device: DeviceId,
        resource: Resource,
        spec: DecodeSpec,
    ) -> SubscriptionHandle {
        let mut inner = self.lock();
        let handle = SubscriptionHandle(inner.next_handle);
        inner.next_handle += 1;

        let key = (device, resource);
        let entry = inner.keys.entry(key.clone()).or_insert_with(|| KeyEntry {
            spec,
            handles: BTreeSet::new(),
        });
        if entry.spec != spec {
            warn!(
                device = %key.0,
                %resource,
                kept = ?entry.spec,
                ignored = ?spec,
                "conflicting decode spec for subscribed resource; keeping the first"
            );
        }
        entry.handles.insert(handle);
        debug!(device = %key.0, %resource, subscribers = entry.handles.len(), "subscribed");
        inner.handles.insert(handle, HandleEntry { key, spec });
        handle
    }

    /// Drop one subscription. The key disappears only when its last handle
    /// goes. Returns `false` if the handle was not live.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut inner = self.lock();
        let Some(HandleEntry { key, .. }) = inner.handles.remove(&handle) else {
            return false;
        };
        let RegistryInner { keys, handles, .. } = &mut *inner;
        let Some(entry) = keys.get_mut(&key) else {
            return true;
        };
        entry.handles.remove(&handle);

        let Some(earliest) = entry.handles.first() else {
            keys.remove(&key);
            debug!(device = %key.0, resource = %key.1, "last subscriber gone");
            return true;
        };
        let next = handles.get(earliest).map_or(entry.spec, |h| h.spec);
        if next != entry.spec {
            debug!(
                device = %key.0,
                resource = %key.1,
                spec = ?next,
                "decode spec taken from the earliest remaining subscriber"
            );
            entry.spec = next;
        }
        true
    }

    /// Distinct reads currently registered for `device`.
    pub fn snapshot_keys(&self, device: &DeviceId) -> Vec<ReadRequest> {
        self.lock()
            .keys
            .iter()
            .filter(|((d, _), _)| d == device)
            .map(|((_, resource), entry)| ReadRequest {
                resource: *resource,
                spec: entry.spec,
            })
            .collect()
    }

    /// Distinct reads for every device, taken under a single lock so the
    /// result is one consistent view.
    pub fn snapshot_all(&self) -> Vec<(DeviceId, ReadRequest)> {
        self.lock()
            .keys
            .iter()
            .map(|((device, resource), entry)| {
                (
                    device.clone(),
                    ReadRequest {
                        resource: *resource,
                        spec: entry.spec,
                    },
                )
            })
            .collect()
    }

    /// Devices with at least one live key.
    pub fn devices(&self) -> Vec<DeviceId> {
        let inner = self.lock();
        let mut devices: Vec<DeviceId> = inner.keys.keys().map(|(d, _)| d.clone()).collect();
        devices.dedup();
        devices
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().keys.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // Every mutation leaves the maps consistent, so a poisoned lock is
        // still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use thermopoll_api::PropertyPath;

    use super::*;

    fn spec(bytes: u8, scale: f64) -> DecodeSpec {
        DecodeSpec::new(bytes, true, scale).unwrap()
    }

    #[test]
    fn identical_subscriptions_collapse() {
        let reg = RequestRegistry::new();
        let dev = DeviceId::from("main");
        let a = reg.subscribe(dev.clone(), Resource::Telemetry(12), spec(2, 0.1));
        let b = reg.subscribe(dev.clone(), Resource::Telemetry(12), spec(2, 0.1));
        let c = reg.subscribe(dev.clone(), Resource::Telemetry(12), spec(2, 0.1));

        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.snapshot_keys(&dev).len(), 1);
    }

    #[test]
    fn key_survives_until_last_handle_goes() {
        let reg = RequestRegistry::new();
        let dev = DeviceId::from("main");
        let a = reg.subscribe(dev.clone(), Resource::Telemetry(1), spec(1, 1.0));
        let b = reg.subscribe(dev.clone(), Resource::Telemetry(1), spec(1, 1.0));

        assert!(reg.unsubscribe(a));
        assert_eq!(reg.len(), 1);
        assert!(!reg.unsubscribe(a), "double unsubscribe is a no-op");
        assert!(reg.unsubscribe(b));
        assert!(reg.is_empty());
        assert!(reg.devices().is_empty());
    }

    #[test]
    fn first_registered_spec_wins() {
        let reg = RequestRegistry::new();
        let dev = DeviceId::from("main");
        reg.subscribe(dev.clone(), Resource::Telemetry(7), spec(2, 0.1));
        reg.subscribe(dev.clone(), Resource::Telemetry(7), spec(1, 1.0));

        let keys = reg.snapshot_keys(&dev);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].spec, spec(2, 0.1));
    }

    #[test]
    fn spec_follows_earliest_remaining_subscriber() {
        let reg = RequestRegistry::new();
        let dev = DeviceId::from("main");
        let first = reg.subscribe(dev.clone(), Resource::Telemetry(7), spec(2, 0.1));
        let second = reg.subscribe(dev.clone(), Resource::Telemetry(7), spec(1, 1.0));
        let third = reg.subscribe(dev.clone(), Resource::Telemetry(7), spec(2, 0.5));

        assert!(reg.unsubscribe(first));
        assert_eq!(reg.snapshot_keys(&dev)[0].spec, spec(1, 1.0));

        // A later subscriber leaving does not disturb the key spec.
        assert!(reg.unsubscribe(third));
        assert_eq!(reg.snapshot_keys(&dev)[0].spec, spec(1, 1.0));

        assert!(reg.unsubscribe(second));
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshots_are_per_device() {
        let reg = RequestRegistry::new();
        let main = DeviceId::from("main");
        let garage = DeviceId::from("garage");
        reg.subscribe(main.clone(), Resource::Telemetry(1), spec(1, 1.0));
        reg.subscribe(
            main.clone(),
            Resource::Property(PropertyPath::new(1, 2, 3)),
            spec(2, 0.5),
        );
        reg.subscribe(garage.clone(), Resource::Telemetry(1), spec(1, 1.0));

        assert_eq!(reg.snapshot_keys(&main).len(), 2);
        assert_eq!(reg.snapshot_keys(&garage).len(), 1);
        assert_eq!(reg.snapshot_all().len(), 3);
        assert_eq!(reg.devices(), vec![garage, main]);
    }
}
