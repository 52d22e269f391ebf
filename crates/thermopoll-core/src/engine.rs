// ── Engine ──
//
// Lifecycle facade over the whole polling stack: one DeviceClient (with its
// own RateLimiterCache) per configured device, the shared request registry,
// the batch coordinator and per-device aggregate coordinators. Background
// tasks run under a single cancellation token.

use std::collections::HashMap;
use std::sync::Arc;

use thermopoll_api::{Dashboard, DeviceClient, DeviceId, Resource, ThermalProfile};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::AggregateCoordinator;
use crate::batch::{BatchConfig, BatchCoordinator};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::registry::RequestRegistry;
use crate::snapshot::ResultSnapshot;

/// Per-device handles owned by the engine.
pub struct DeviceHandles {
    pub client: Arc<DeviceClient>,
    pub dashboard: Arc<AggregateCoordinator<Dashboard>>,
    pub thermal_profile: Arc<AggregateCoordinator<ThermalProfile>>,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. [`Engine::new`] builds every
/// client and registers the configured sensors; [`Engine::start`] spawns
/// the pollers; [`Engine::shutdown`] stops them and closes every device
/// gate.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    devices: HashMap<DeviceId, DeviceHandles>,
    registry: Arc<RequestRegistry>,
    batch: Arc<BatchCoordinator>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build clients and coordinators. Does not start polling.
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        if config.batch_interval.is_zero() {
            return Err(CoreError::Config {
                message: "batch interval must be greater than zero".into(),
            });
        }
        let registry = Arc::new(RequestRegistry::new());
        let mut devices = HashMap::with_capacity(config.devices.len());

        for device in &config.devices {
            if devices.contains_key(&device.id) {
                return Err(CoreError::Config {
                    message: format!("device '{}' is configured twice", device.id),
                });
            }
            let client = Arc::new(DeviceClient::new(
                device.id.clone(),
                device.url.clone(),
                &device.client,
            )?);
            for sensor in &device.sensors {
                registry.subscribe(device.id.clone(), sensor.resource, sensor.spec);
            }
            devices.insert(
                device.id.clone(),
                DeviceHandles {
                    dashboard: Arc::new(AggregateCoordinator::new(
                        Arc::clone(&client),
                        config.aggregate_interval,
                    )),
                    thermal_profile: Arc::new(AggregateCoordinator::new(
                        Arc::clone(&client),
                        config.aggregate_interval,
                    )),
                    client,
                },
            );
        }

        let clients = devices
            .iter()
            .map(|(id, handles)| (id.clone(), Arc::clone(&handles.client)))
            .collect();
        let batch = Arc::new(BatchCoordinator::new(
            Arc::clone(&registry),
            clients,
            BatchConfig {
                interval: config.batch_interval,
                unavailable_after: config.unavailable_after,
                max_concurrency: config.max_concurrency,
            },
        ));

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                devices,
                registry,
                batch,
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.inner.registry
    }

    pub fn batch(&self) -> &Arc<BatchCoordinator> {
        &self.inner.batch
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the batch poller and, unless disabled, the aggregate pollers.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            debug!("engine already running");
            return Ok(());
        }

        let batch = Arc::clone(&self.inner.batch);
        let cancel = self.inner.cancel.clone();
        handles.push(tokio::spawn(async move { batch.run(cancel).await }));

        if !self.inner.config.aggregate_interval.is_zero() {
            for device in self.inner.devices.values() {
                let dashboard = Arc::clone(&device.dashboard);
                let cancel = self.inner.cancel.clone();
                handles.push(tokio::spawn(async move { dashboard.run(cancel).await }));

                let profile = Arc::clone(&device.thermal_profile);
                let cancel = self.inner.cancel.clone();
                handles.push(tokio::spawn(async move { profile.run(cancel).await }));
            }
        }

        info!(
            devices = self.inner.devices.len(),
            sensors = self.inner.registry.len(),
            "engine started"
        );
        Ok(())
    }

    /// Stop every poller and close every device gate.
    ///
    /// Requests already on the wire finish or time out; nothing new is
    /// admitted afterwards.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        for device in self.inner.devices.values() {
            device.client.close();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.inner.devices.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn device(&self, id: &DeviceId) -> Result<&DeviceHandles, CoreError> {
        self.inner
            .devices
            .get(id)
            .ok_or_else(|| CoreError::UnknownDevice {
                device: id.to_string(),
            })
    }

    pub fn client(&self, id: &DeviceId) -> Result<&Arc<DeviceClient>, CoreError> {
        self.device(id).map(|d| &d.client)
    }

    pub fn dashboard(
        &self,
        id: &DeviceId,
    ) -> Result<&Arc<AggregateCoordinator<Dashboard>>, CoreError> {
        self.device(id).map(|d| &d.dashboard)
    }

    pub fn thermal_profile(
        &self,
        id: &DeviceId,
    ) -> Result<&Arc<AggregateCoordinator<ThermalProfile>>, CoreError> {
        self.device(id).map(|d| &d.thermal_profile)
    }

    /// Shortcut for [`BatchCoordinator::latest`].
    pub fn latest(&self, device: &DeviceId, resource: Resource) -> Option<ResultSnapshot> {
        self.inner.batch.latest(device, resource)
    }
}
