// thermopoll-api: rate-limited async client and byte codec for local
// heat-pump HTTP devices.

pub mod aggregate;
pub mod client;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod limiter;
pub mod model;
pub mod retry;
pub mod transport;

pub use aggregate::{
    Aggregate, Dashboard, DashboardPatch, DeviceStatus, OperatingState, Patch, ThermalProfile,
    ThermalProfilePatch,
};
pub use client::{CacheKey, ClientConfig, DeviceClient, DeviceInfo, DeviceLimiter};
pub use endpoint::DeviceEndpoint;
pub use error::Error;
pub use limiter::{LimiterConfig, LimiterStats, RateLimiterCache};
pub use model::{
    ByteWidth, DecodeSpec, DeviceId, PropertyPath, Reading, Resource, ResourceKind,
};
pub use retry::RetryPolicy;
pub use transport::TransportConfig;
