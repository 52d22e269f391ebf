// ── Batch coordinator ──
//
// Fixed-interval poller for every subscribed scalar data point. Each cycle
// drains the registry once, issues one read per distinct key (bounded
// concurrency, gated per device by the client's RateLimiterCache) and
// publishes the outcome into a snapshot map consumers read without
// blocking.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::StreamExt;
use futures_util::{future, stream};
use strum::Display;
use thermopoll_api::{DeviceClient, DeviceId, Reading, Resource};
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::registry::{ReadRequest, RequestRegistry};
use crate::snapshot::ResultSnapshot;

/// Where the coordinator is within a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BatchPhase {
    Idle,
    Draining,
    Fetching,
    Publishing,
}

/// Outcome of one full cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Batch coordinator tuning.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub interval: Duration,
    pub unavailable_after: u32,
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            unavailable_after: 3,
            max_concurrency: 8,
        }
    }
}

type SnapshotKey = (DeviceId, Resource);

/// Drives the polling loop and owns the published snapshots.
pub struct BatchCoordinator {
    registry: Arc<RequestRegistry>,
    clients: HashMap<DeviceId, Arc<DeviceClient>>,
    config: BatchConfig,
    snapshots: DashMap<SnapshotKey, ResultSnapshot>,
    phase: watch::Sender<BatchPhase>,
    cycles: watch::Sender<u64>,
    // One cycle at a time, whether driven by the timer or by `run_cycle`.
    cycle_lock: Mutex<()>,
}

impl BatchCoordinator {
    pub fn new(
        registry: Arc<RequestRegistry>,
        clients: HashMap<DeviceId, Arc<DeviceClient>>,
        config: BatchConfig,
    ) -> Self {
        let (phase, _) = watch::channel(BatchPhase::Idle);
        let (cycles, _) = watch::channel(0);
        Self {
            registry,
            clients,
            config,
            snapshots: DashMap::new(),
            phase,
            cycles,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    // ── Consumer API ─────────────────────────────────────────────────

    /// Latest snapshot for one data point. Never blocks, never fetches.
    pub fn latest(&self, device: &DeviceId, resource: Resource) -> Option<ResultSnapshot> {
        self.snapshots
            .get(&(device.clone(), resource))
            .map(|entry| entry.value().clone())
    }

    /// Every published snapshot, ordered by device then resource.
    pub fn snapshots(&self) -> Vec<ResultSnapshot> {
        let mut all: Vec<ResultSnapshot> = self
            .snapshots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            (&a.device_id, a.resource).cmp(&(&b.device_id, b.resource))
        });
        all
    }

    /// Observe phase transitions.
    pub fn subscribe_phase(&self) -> watch::Receiver<BatchPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> BatchPhase {
        *self.phase.borrow()
    }

    /// Counter bumped after every published cycle.
    pub fn subscribe_cycles(&self) -> watch::Receiver<u64> {
        self.cycles.subscribe()
    }

    // ── Cycle ────────────────────────────────────────────────────────

    /// Run one full Draining → Fetching → Publishing cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let _idle = PhaseReset(&self.phase);

        self.phase.send_replace(BatchPhase::Draining);
        let work = self.registry.snapshot_all();
        let live: HashSet<SnapshotKey> = work
            .iter()
            .map(|(device, req)| (device.clone(), req.resource))
            .collect();

        self.phase.send_replace(BatchPhase::Fetching);
        let unresolved = self.resolve_serials(&work).await;
        let results: Vec<(DeviceId, Resource, Result<Reading, CoreError>)> = stream::iter(work)
            .map(|(device, req)| {
                let early = unresolved.get(&device).cloned();
                async move {
                    let result = match early {
                        Some(err) => Err(err),
                        None => self.fetch(&device, req).await,
                    };
                    (device, req.resource, result)
                }
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        self.phase.send_replace(BatchPhase::Publishing);
        let report = self.publish(results);
        self.snapshots.retain(|key, _| live.contains(key));
        self.phase.send_replace(BatchPhase::Idle);
        self.cycles.send_modify(|n| *n += 1);

        debug!(
            requested = report.requested,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch cycle complete"
        );
        report
    }

    /// Resolve the serial of every device with work this cycle, once per
    /// device. Devices whose serial cannot be resolved are returned with
    /// the error so their keys fail without a request each.
    async fn resolve_serials(
        &self,
        work: &[(DeviceId, ReadRequest)],
    ) -> HashMap<DeviceId, CoreError> {
        let devices: BTreeSet<&DeviceId> = work.iter().map(|(device, _)| device).collect();
        let lookups = devices.into_iter().filter_map(|device| {
            let client = self.clients.get(device)?;
            Some(async move { (device, client.serial().await.err()) })
        });
        future::join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(device, err)| {
                let err = err?;
                warn!(%device, error = %err, "cannot resolve device serial");
                Some((device.clone(), CoreError::from(err)))
            })
            .collect()
    }

    async fn fetch(&self, device: &DeviceId, req: ReadRequest) -> Result<Reading, CoreError> {
        let client = self
            .clients
            .get(device)
            .ok_or_else(|| CoreError::UnknownDevice {
                device: device.to_string(),
            })?;
        Ok(client.read(req.resource, req.spec).await?)
    }

    fn publish(
        &self,
        results: Vec<(DeviceId, Resource, Result<Reading, CoreError>)>,
    ) -> CycleReport {
        let now = Utc::now();
        let mut report = CycleReport {
            requested: results.len(),
            ..CycleReport::default()
        };

        for (device, resource, result) in results {
            let mut snap = self
                .snapshots
                .entry((device.clone(), resource))
                .or_insert_with(|| ResultSnapshot::new(device.clone(), resource));
            match result {
                Ok(reading) => {
                    if snap.unavailable {
                        info!(%device, %resource, "data point available again");
                    }
                    snap.record_success(reading, now);
                    report.succeeded += 1;
                }
                Err(e) => {
                    let was_unavailable = snap.unavailable;
                    warn!(%device, %resource, error = %e, "batch read failed");
                    snap.record_failure(e, self.config.unavailable_after);
                    if snap.unavailable && !was_unavailable {
                        warn!(
                            %device,
                            %resource,
                            failures = snap.consecutive_failures,
                            "data point marked unavailable"
                        );
                    }
                    report.failed += 1;
                }
            }
        }
        report
    }

    // ── Background loop ──────────────────────────────────────────────

    /// Poll on the configured interval until `cancel` fires. Cancellation
    /// also abandons a cycle that is mid-fetch.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.config.interval.is_zero() {
            warn!("batch interval is zero; polling disabled");
            return;
        }
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!("batch cycle abandoned on shutdown");
                            break;
                        }
                        report = self.run_cycle() => {
                            if report.failed > 0 {
                                warn!(
                                    failed = report.failed,
                                    requested = report.requested,
                                    "batch cycle had failures"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Puts the phase back to `Idle` if a cycle is dropped mid-way.
struct PhaseReset<'a>(&'a watch::Sender<BatchPhase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|phase| {
            let changed = *phase != BatchPhase::Idle;
            *phase = BatchPhase::Idle;
            changed
        });
    }
}
