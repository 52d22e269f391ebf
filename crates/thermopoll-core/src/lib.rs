//! Polling engine between `thermopoll-api` and its consumers (CLI, home
//! automation glue).
//!
//! - **[`Engine`]**: lifecycle facade. Builds one rate-limited
//!   [`DeviceClient`](thermopoll_api::DeviceClient) per device, registers
//!   configured sensors and spawns the pollers under one cancellation token.
//!
//! - **[`RequestRegistry`]**: handle-based subscriptions. Identical
//!   `(device, resource)` keys collapse into one read per cycle.
//!
//! - **[`BatchCoordinator`]**: fixed-interval Draining → Fetching →
//!   Publishing cycle. Consumers read [`ResultSnapshot`]s with
//!   [`latest`](BatchCoordinator::latest), which never blocks.
//!
//! - **[`AggregateCoordinator`]**: periodic poller for a whole-document
//!   resource with optimistic writes.

pub mod aggregate;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod snapshot;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregate::{AggregateCoordinator, AggregateState};
pub use batch::{BatchConfig, BatchCoordinator, BatchPhase, CycleReport};
pub use config::{DeviceConfig, EngineConfig, SensorConfig};
pub use engine::{DeviceHandles, Engine};
pub use error::CoreError;
pub use registry::{ReadRequest, RequestRegistry, SubscriptionHandle};
pub use snapshot::ResultSnapshot;
