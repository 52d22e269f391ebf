// Device HTTP client
//
// Translates semantic reads and writes into HTTP calls against one device.
// Every request goes through the device's `RateLimiterCache`; transient
// transport failures are retried per the client's `RetryPolicy`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::aggregate::Aggregate;
use crate::endpoint::DeviceEndpoint;
use crate::error::Error;
use crate::limiter::{LimiterConfig, RateLimiterCache};
use crate::model::{DecodeSpec, DeviceId, PropertyPath, Reading, Resource};
use crate::retry::RetryPolicy;
use crate::transport::TransportConfig;

/// Identity document served at `/api/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
}

/// Cache key within one device's `RateLimiterCache`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Info,
    Resource(Resource),
    Aggregate(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Resource(r) => write!(f, "{r}"),
            Self::Aggregate(name) => write!(f, "aggregate:{name}"),
        }
    }
}

/// `{"data": [..]}` body used by telemetry and property endpoints.
#[derive(Debug, Serialize, Deserialize)]
struct BytePayload {
    data: Vec<u8>,
}

/// Device-supplied error body on non-2xx responses.
#[derive(Deserialize)]
struct DeviceErrorBody {
    error: String,
}

/// Everything needed to build a [`DeviceClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub limiter: LimiterConfig,
    pub retry: RetryPolicy,
    /// TTL for cached reads.
    pub cache_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            limiter: LimiterConfig::default(),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(5),
        }
    }
}

/// Shared gate type for one device.
pub type DeviceLimiter = RateLimiterCache<CacheKey, Value>;

/// Async client for one device.
///
/// Reads are cached and single-flighted by the device's
/// [`RateLimiterCache`]; writes pass through the same gate and start its
/// cooldown. The device serial scoping every URL is fetched on first use.
pub struct DeviceClient {
    device_id: DeviceId,
    http: reqwest::Client,
    endpoint: DeviceEndpoint,
    limiter: Arc<DeviceLimiter>,
    transport: TransportConfig,
    retry: RetryPolicy,
    cache_ttl: Duration,
}

impl DeviceClient {
    /// Create a client with its own HTTP client and request gate.
    pub fn new(device_id: DeviceId, base_url: Url, config: &ClientConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        Ok(Self::with_client(
            device_id,
            http,
            DeviceEndpoint::new(base_url),
            Arc::new(RateLimiterCache::new(config.limiter.clone())),
            config,
        ))
    }

    /// Create a client around pre-built parts.
    ///
    /// Use this to share one `reqwest::Client` between devices or to inject
    /// an endpoint whose serial is already known.
    pub fn with_client(
        device_id: DeviceId,
        http: reqwest::Client,
        endpoint: DeviceEndpoint,
        limiter: Arc<DeviceLimiter>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            device_id,
            http,
            endpoint,
            limiter,
            transport: config.transport.clone(),
            retry: config.retry.clone(),
            cache_ttl: config.cache_ttl,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.endpoint
    }

    /// The request gate shared by every call on this device.
    pub fn limiter(&self) -> &Arc<DeviceLimiter> {
        &self.limiter
    }

    /// Stop admitting new requests for this device.
    pub fn close(&self) {
        self.limiter.close();
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// Fetch the identity document. Cached like any other read.
    pub async fn device_info(&self) -> Result<DeviceInfo, Error> {
        let url = self.endpoint.info_url()?;
        let payload = self.cached_get(CacheKey::Info, &url).await?;
        decode_json(payload)
    }

    /// The device serial, fetched once and reused for every URL.
    pub async fn serial(&self) -> Result<&str, Error> {
        let this = self;
        self.endpoint
            .serial(move || async move {
                let info = this.device_info().await?;
                info!(device = %this.device_id, serial = %info.serial, "resolved device serial");
                Ok(info.serial)
            })
            .await
    }

    // ── Scalar reads ─────────────────────────────────────────────────

    /// Read one telemetry value.
    pub async fn read_telemetry(&self, id: u16, spec: DecodeSpec) -> Result<f64, Error> {
        self.read(Resource::Telemetry(id), spec)
            .await
            .map(|r| r.value)
    }

    /// Read one property value.
    pub async fn read_property(&self, path: PropertyPath, spec: DecodeSpec) -> Result<f64, Error> {
        self.read(Resource::Property(path), spec)
            .await
            .map(|r| r.value)
    }

    /// Read and decode one data point, keeping the raw value bytes.
    pub async fn read(&self, resource: Resource, spec: DecodeSpec) -> Result<Reading, Error> {
        let serial = self.serial().await?;
        let url = self.endpoint.resource_url(serial, resource)?;
        let payload = self.cached_get(CacheKey::Resource(resource), &url).await?;

        let BytePayload { data } = decode_json(payload)?;
        let bytes = match resource {
            Resource::Telemetry(_) => data.as_slice(),
            Resource::Property(path) => strip_identifier(&data, path)?,
        };
        let width = spec.width.len();
        let raw = bytes.get(..width).ok_or_else(|| Error::Deserialization {
            message: format!(
                "{resource}: expected at least {width} value bytes, got {}",
                bytes.len()
            ),
            body: format!("{data:?}"),
        })?;

        let value = spec.decode(raw)?;
        Ok(Reading {
            raw: raw.to_vec(),
            value,
        })
    }

    // ── Scalar writes ────────────────────────────────────────────────

    /// Encode and write one property value.
    ///
    /// The value is validated against `spec` before any request is made.
    pub async fn write_property(
        &self,
        path: PropertyPath,
        value: f64,
        spec: DecodeSpec,
    ) -> Result<(), Error> {
        let mut data = vec![path.identifier_byte()];
        data.extend(spec.encode(value)?);
        let body = serde_json::to_value(BytePayload { data })
            .map_err(|e| Error::validation(format!("cannot serialize payload: {e}")))?;

        let serial = self.serial().await?;
        let url = self.endpoint.property_url(serial, path)?;
        let key = CacheKey::Resource(Resource::Property(path));

        debug!(device = %self.device_id, %path, value, "writing property");
        self.gated_write(&key, Method::PUT, &url, Some(&body))
            .await
            .map(|_| ())
    }

    // ── Aggregate resources ──────────────────────────────────────────

    /// Read a whole-document resource as raw JSON.
    pub async fn read_aggregate_raw(&self, resource_name: &str) -> Result<Value, Error> {
        let serial = self.serial().await?;
        let url = self.endpoint.aggregate_url(serial, resource_name)?;
        self.cached_get(CacheKey::Aggregate(resource_name.to_owned()), &url)
            .await
    }

    /// Write a whole-document resource. `body` must already carry every
    /// known field, with `null` for fields that should not change.
    pub async fn write_aggregate_raw(
        &self,
        resource_name: &str,
        body: &Value,
    ) -> Result<Value, Error> {
        let serial = self.serial().await?;
        let url = self.endpoint.aggregate_url(serial, resource_name)?;
        let key = CacheKey::Aggregate(resource_name.to_owned());
        self.gated_write(&key, Method::PUT, &url, Some(body)).await
    }

    /// Read a typed whole-document resource.
    pub async fn read_aggregate<A: Aggregate>(&self) -> Result<A, Error> {
        decode_json(self.read_aggregate_raw(A::RESOURCE).await?)
    }

    /// Apply a partial update to a typed resource. Unset patch fields are
    /// sent as explicit `null`.
    pub async fn write_aggregate<A: Aggregate>(&self, patch: &A::Patch) -> Result<Value, Error> {
        let body = serde_json::to_value(patch)
            .map_err(|e| Error::validation(format!("cannot serialize patch: {e}")))?;
        debug!(device = %self.device_id, resource = A::RESOURCE, %body, "writing aggregate");
        self.write_aggregate_raw(A::RESOURCE, &body).await
    }

    // ── Control ──────────────────────────────────────────────────────

    /// Ask the device to reset. Sent once, never retried; every cached read
    /// is dropped on success.
    pub async fn reset_device(&self) -> Result<(), Error> {
        let serial = self.serial().await?;
        let url = self.endpoint.reset_url(serial)?;
        info!(device = %self.device_id, "resetting device");
        self.limiter
            .write(|| self.send(Method::POST, &url, None))
            .await?;
        self.limiter.clear();
        Ok(())
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn cached_get(&self, key: CacheKey, url: &Url) -> Result<Value, Error> {
        let limiter = &self.limiter;
        let ttl = self.cache_ttl;
        let key = &key;
        let what = format!("{} {key}", self.device_id);
        self.retry
            .run(&what, move || {
                limiter.get_or_fetch(key.clone(), ttl, move || self.send(Method::GET, url, None))
            })
            .await
    }

    async fn gated_write(
        &self,
        key: &CacheKey,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Value, Error> {
        let limiter = &self.limiter;
        let what = format!("{} write {key}", self.device_id);
        self.retry
            .run(&what, move || {
                let method = method.clone();
                limiter.write_through(key, move || self.send(method, url, body))
            })
            .await
    }

    async fn send(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<Value, Error> {
        let (timeout, timeout_ms) = if method == Method::GET {
            (self.transport.read_timeout, self.transport.read_timeout_ms())
        } else {
            (self.transport.write_timeout, self.transport.write_timeout_ms())
        };
        debug!("{method} {url}");

        let mut builder = self.http.request(method, url.clone()).timeout(timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::from_reqwest(&e, timeout_ms))?;

        parse_response(resp, timeout_ms).await
    }
}

/// Turn a response into JSON, mapping non-2xx statuses to `Error::Device`.
async fn parse_response(resp: reqwest::Response, timeout_ms: u64) -> Result<Value, Error> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::from_reqwest(&e, timeout_ms))?;

    if !status.is_success() {
        let message = serde_json::from_str::<DeviceErrorBody>(&body).map_or_else(
            |_| body.chars().take(200).collect::<String>(),
            |b| b.error,
        );
        return Err(Error::Device {
            status: status.as_u16(),
            message,
        });
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}

fn decode_json<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, Error> {
    T::deserialize(&payload).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: payload.to_string(),
    })
}

/// Property payloads echo the identifier byte before the value bytes.
fn strip_identifier(data: &[u8], path: PropertyPath) -> Result<&[u8], Error> {
    match data.split_first() {
        Some((&id, rest)) if id == path.identifier_byte() => Ok(rest),
        _ => Err(Error::Deserialization {
            message: format!(
                "property {path}: expected identifier byte {} first",
                path.identifier_byte()
            ),
            body: format!("{data:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_byte_is_checked_and_stripped() {
        let path = PropertyPath::new(1, 2, 7);
        assert_eq!(strip_identifier(&[7, 215, 0], path).ok(), Some(&[215u8, 0][..]));
        assert!(strip_identifier(&[8, 215, 0], path).is_err());
        assert!(strip_identifier(&[], path).is_err());
    }

    #[test]
    fn cache_keys_render_for_logs() {
        assert_eq!(CacheKey::Info.to_string(), "info");
        assert_eq!(
            CacheKey::Resource(Resource::Telemetry(4)).to_string(),
            "telemetry:4"
        );
        assert_eq!(
            CacheKey::Aggregate("dashboard".into()).to_string(),
            "aggregate:dashboard"
        );
    }
}
