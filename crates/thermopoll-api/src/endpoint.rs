// Device endpoint: base URL plus the device serial that scopes every
// resource path. The serial is fetched lazily, once, and reused.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use url::Url;

use crate::error::Error;
use crate::model::{PropertyPath, Resource};

/// Base address of one device and its lazily resolved serial.
#[derive(Debug)]
pub struct DeviceEndpoint {
    base_url: Url,
    serial: OnceCell<String>,
    failures: Mutex<FailureLog>,
}

/// Last failed serial fetch, numbered so waiters can tell whether it
/// happened while they were queued.
#[derive(Debug, Default)]
struct FailureLog {
    generation: u64,
    last: Option<Error>,
}

impl DeviceEndpoint {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            serial: OnceCell::new(),
            failures: Mutex::default(),
        }
    }

    /// Endpoint whose serial is already known (skips the info request).
    pub fn with_serial(base_url: Url, serial: impl Into<String>) -> Self {
        Self {
            base_url,
            serial: OnceCell::new_with(Some(serial.into())),
            failures: Mutex::default(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The serial, if it has been resolved.
    pub fn cached_serial(&self) -> Option<&str> {
        self.serial.get().map(String::as_str)
    }

    /// Resolve the serial, running `fetch` only if nobody has resolved it yet.
    ///
    /// Concurrent callers share a single in-flight `fetch`, and its failure
    /// too: callers queued behind a failed fetch get the same error instead
    /// of each running their own. A caller arriving after the failure
    /// starts a fresh fetch.
    pub async fn serial<F, Fut>(&self, fetch: F) -> Result<&str, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        if let Some(serial) = self.serial.get() {
            return Ok(serial);
        }
        let seen = self.failures().generation;

        self.serial
            .get_or_try_init(|| async move {
                if let Some(err) = self.failure_since(seen) {
                    return Err(err);
                }
                let result = fetch().await;
                if let Err(err) = &result {
                    let mut log = self.failures();
                    log.generation += 1;
                    log.last = Some(err.clone());
                }
                result
            })
            .await
            .map(String::as_str)
    }

    fn failures(&self) -> MutexGuard<'_, FailureLog> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure_since(&self, generation: u64) -> Option<Error> {
        let log = self.failures();
        if log.generation > generation {
            log.last.clone()
        } else {
            None
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/api/info`, the only unscoped path.
    pub fn info_url(&self) -> Result<Url, Error> {
        self.url(&["api", "info"])
    }

    pub fn resource_url(&self, serial: &str, resource: Resource) -> Result<Url, Error> {
        match resource {
            Resource::Telemetry(id) => {
                self.url(&["api", serial, "telemetry", &id.to_string()])
            }
            Resource::Property(path) => self.property_url(serial, path),
        }
    }

    pub fn property_url(&self, serial: &str, path: PropertyPath) -> Result<Url, Error> {
        self.url(&[
            "api",
            serial,
            "property",
            &path.group.to_string(),
            &path.section.to_string(),
            &path.index.to_string(),
        ])
    }

    pub fn aggregate_url(&self, serial: &str, resource_name: &str) -> Result<Url, Error> {
        self.url(&["api", serial, resource_name])
    }

    pub fn reset_url(&self, serial: &str) -> Result<Url, Error> {
        self.url(&["api", serial, "reset"])
    }

    /// Append `segments` to the base path, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::validation(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn endpoint() -> DeviceEndpoint {
        DeviceEndpoint::new(Url::parse("http://192.168.1.50/").unwrap())
    }

    #[test]
    fn builds_scoped_paths() {
        let ep = endpoint();
        assert_eq!(
            ep.resource_url("HP01", Resource::Telemetry(12))
                .unwrap()
                .as_str(),
            "http://192.168.1.50/api/HP01/telemetry/12"
        );
        assert_eq!(
            ep.resource_url("HP01", Resource::Property(PropertyPath::new(1, 2, 3)))
                .unwrap()
                .as_str(),
            "http://192.168.1.50/api/HP01/property/1/2/3"
        );
        assert_eq!(
            ep.aggregate_url("HP01", "dashboard").unwrap().as_str(),
            "http://192.168.1.50/api/HP01/dashboard"
        );
        assert_eq!(
            ep.info_url().unwrap().as_str(),
            "http://192.168.1.50/api/info"
        );
    }

    #[test]
    fn serial_is_encoded_as_one_segment() {
        let ep = endpoint();
        assert_eq!(
            ep.resource_url("a/b?c#d", Resource::Telemetry(12))
                .unwrap()
                .as_str(),
            "http://192.168.1.50/api/a%2Fb%3Fc%23d/telemetry/12"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let ep = DeviceEndpoint::new(Url::parse("http://gateway.local/hp/").unwrap());
        assert_eq!(
            ep.reset_url("HP01").unwrap().as_str(),
            "http://gateway.local/hp/api/HP01/reset"
        );
    }

    #[test]
    fn non_base_url_is_rejected() {
        let ep = DeviceEndpoint::new(Url::parse("mailto:hp@example.com").unwrap());
        assert!(matches!(ep.info_url(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn concurrent_serial_fetches_collapse() {
        let ep = Arc::new(endpoint());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ep = Arc::clone(&ep);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                ep.serial(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    Ok("HP01".to_string())
                })
                .await
                .map(ToOwned::to_owned)
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap().unwrap(), "HP01");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ep.cached_serial(), Some("HP01"));
    }

    #[tokio::test]
    async fn failed_serial_fetch_is_retried_later() {
        let ep = endpoint();
        let first = ep
            .serial(|| async { Err(Error::Cancelled) })
            .await
            .map(ToOwned::to_owned);
        assert!(first.is_err());
        assert!(ep.cached_serial().is_none());

        let second = ep.serial(|| async { Ok("HP02".to_string()) }).await.unwrap();
        assert_eq!(second, "HP02");
    }

    #[tokio::test]
    async fn queued_callers_share_a_failed_fetch() {
        let ep = Arc::new(endpoint());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ep = Arc::clone(&ep);
            let calls = Arc::clone(&calls);
            tasks.push(tokio::spawn(async move {
                ep.serial(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    Err::<String, _>(Error::Timeout {
                        url: "http://192.168.1.50/api/info".into(),
                        timeout_ms: 50,
                    })
                })
                .await
                .map(ToOwned::to_owned)
            }));
        }
        for t in tasks {
            assert!(matches!(t.await.unwrap(), Err(Error::Timeout { .. })));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ep.cached_serial().is_none());
    }
}
