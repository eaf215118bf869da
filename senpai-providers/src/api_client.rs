//! Rate-limited, cached request wrapper
//!
//! Every upstream call in this crate goes through [`ApiClient::request`]:
//!
//! 1. Serve from the shared response cache when the call site gave a TTL and a
//!    live entry exists for the `(endpoint, params)` fingerprint.
//! 2. Wait for the host's minimum request interval.
//! 3. Run the call, record its outcome in the monitoring hook.
//! 4. Cache successful results; errors are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;

use crate::cache::{ResponseCache, DEFAULT_CAPACITY};
use crate::error::UpstreamError;
use crate::metrics;
use crate::rate_limit::HostRateLimiter;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Construction parameters for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub default_min_interval: Duration,
    /// Per logical host overrides (e.g. `"anilist" -> 700ms`).
    pub min_intervals: HashMap<String, Duration>,
    pub cache_capacity: u64,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        let mut min_intervals = HashMap::new();
        min_intervals.insert("catalog".to_string(), Duration::from_millis(250));
        min_intervals.insert("anilist".to_string(), Duration::from_millis(700));
        Self {
            default_min_interval: Duration::from_millis(250),
            min_intervals,
            cache_capacity: DEFAULT_CAPACITY,
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Description of one upstream call.
#[derive(Debug, Clone)]
pub struct RequestSpec<'a> {
    /// Logical host used for rate limiting and metrics (`catalog`, `anilist`).
    pub host: &'a str,
    /// Endpoint name, part of the cache fingerprint.
    pub endpoint: &'a str,
    /// Query parameters or GraphQL variables, part of the cache fingerprint.
    pub params: serde_json::Value,
    /// Cache TTL; `None` disables caching for this call.
    pub ttl: Option<Duration>,
}

impl<'a> RequestSpec<'a> {
    #[must_use]
    pub fn new(host: &'a str, endpoint: &'a str, params: serde_json::Value) -> Self {
        Self {
            host,
            endpoint,
            params,
            ttl: None,
        }
    }

    #[must_use]
    pub fn cached(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn cache_key(&self) -> String {
        ResponseCache::fingerprint(self.endpoint, &self.params)
    }
}

/// Shared foundation for upstream clients.
///
/// Cloning is cheap and clones share the connection pool, rate limiter and
/// response cache.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    limiter: HostRateLimiter,
    cache: ResponseCache,
}

impl ApiClient {
    /// Build a client with its own connection pool, limiter and cache.
    pub fn new(config: &ApiClientConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self::with_parts(
            http,
            HostRateLimiter::new(config.default_min_interval, config.min_intervals.clone()),
            ResponseCache::new(config.cache_capacity),
        ))
    }

    #[must_use]
    pub fn with_parts(http: Client, limiter: HostRateLimiter, cache: ResponseCache) -> Self {
        Self {
            http,
            limiter,
            cache,
        }
    }

    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    #[must_use]
    pub const fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    #[must_use]
    pub const fn limiter(&self) -> &HostRateLimiter {
        &self.limiter
    }

    /// Run `call` under the host's rate limit, serving from / filling the cache.
    pub async fn request<T, F, Fut>(&self, spec: RequestSpec<'_>, call: F) -> Result<T, UpstreamError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let cache_key = spec.ttl.map(|_| spec.cache_key());
        if let Some(key) = cache_key.as_deref() {
            if let Some(hit) = self.cache.get::<T>(key) {
                tracing::debug!(host = spec.host, endpoint = spec.endpoint, "Serving upstream response from cache");
                return Ok(hit);
            }
        }

        self.limiter.until_ready(spec.host).await;

        let result = call(self.http.clone()).await;
        metrics::record_request(spec.host, result.as_ref().err());

        match &result {
            Ok(value) => {
                if let (Some(key), Some(ttl)) = (cache_key, spec.ttl) {
                    self.cache.set(key, value.clone(), ttl);
                }
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(host = spec.host, endpoint = spec.endpoint, "Upstream rate limit hit: {e}");
            }
            Err(e) => {
                tracing::debug!(
                    host = spec.host,
                    endpoint = spec.endpoint,
                    kind = e.kind(),
                    "Upstream request failed: {e}"
                );
            }
        }

        result
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
