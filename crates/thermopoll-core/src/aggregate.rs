// ── Aggregate coordinators ──
//
// One periodic poller per whole-document resource (dashboard, thermal
// profile) per device. All I/O goes through the device's shared client,
// so aggregate polls queue behind the same RateLimiterCache as batch reads.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thermopoll_api::{Aggregate, DeviceClient};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CoreError;

/// Published state of one aggregate resource.
#[derive(Debug, Clone)]
pub struct AggregateState<A> {
    /// Last good payload. Survives failed polls.
    pub payload: Option<A>,
    /// Whether the most recent poll succeeded.
    pub success: bool,
    pub last_error: Option<CoreError>,
    pub last_success_time: Option<DateTime<Utc>>,
    /// `payload` includes a locally applied write the device has not yet
    /// confirmed through a poll.
    pub optimistic: bool,
}

impl<A> Default for AggregateState<A> {
    fn default() -> Self {
        Self {
            payload: None,
            success: false,
            last_error: None,
            last_success_time: None,
            optimistic: false,
        }
    }
}

/// Periodic poller and writer for one aggregate resource on one device.
pub struct AggregateCoordinator<A: Aggregate> {
    client: Arc<DeviceClient>,
    interval: Duration,
    state: watch::Sender<AggregateState<A>>,
}

impl<A: Aggregate> AggregateCoordinator<A> {
    pub fn new(client: Arc<DeviceClient>, interval: Duration) -> Self {
        let (state, _) = watch::channel(AggregateState::default());
        Self {
            client,
            interval,
            state,
        }
    }

    pub fn client(&self) -> &Arc<DeviceClient> {
        &self.client
    }

    /// Current state. Never blocks on I/O.
    pub fn latest(&self) -> AggregateState<A> {
        self.state.borrow().clone()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<AggregateState<A>> {
        self.state.subscribe()
    }

    /// Poll the resource once and publish the result.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        match self.client.read_aggregate::<A>().await {
            Ok(payload) => {
                self.state.send_replace(AggregateState {
                    payload: Some(payload),
                    success: true,
                    last_error: None,
                    last_success_time: Some(Utc::now()),
                    optimistic: false,
                });
                debug!(
                    device = %self.client.device_id(),
                    resource = A::RESOURCE,
                    "aggregate refreshed"
                );
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.state.send_modify(|state| {
                    state.success = false;
                    state.last_error = Some(err.clone());
                });
                Err(err)
            }
        }
    }

    /// Write a partial update, then apply it to the stored payload so
    /// readers see the new values before the next poll confirms them.
    pub async fn write(&self, patch: &A::Patch) -> Result<(), CoreError> {
        self.client.write_aggregate::<A>(patch).await?;
        self.state.send_modify(|state| {
            if let Some(payload) = state.payload.as_mut() {
                payload.apply(patch);
                state.optimistic = true;
            }
        });
        Ok(())
    }

    /// Poll on the configured interval until `cancel` fires. A zero
    /// interval disables polling.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.interval.is_zero() {
            return;
        }
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        result = self.refresh() => {
                            if let Err(e) = result {
                                warn!(
                                    device = %self.client.device_id(),
                                    resource = A::RESOURCE,
                                    error = %e,
                                    "aggregate refresh failed"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}
