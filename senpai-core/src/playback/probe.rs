//! Source validation probe
//!
//! A probe races one load attempt against a timeout and reduces every
//! outcome to a `bool`. The loader is the seam: production uses an HTTP GET
//! with iframe-compatibility checks, tests plug in scripted loaders.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_SECURITY_POLICY, X_FRAME_OPTIONS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::candidate::PlaybackCandidate;
use crate::error::ProbeError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Attempts to load a source URI.
///
/// Returning `Ok` is the load-success signal, `Err` the load-error signal. A
/// loader may also never return; the probe's timeout covers that.
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self, uri: &str) -> Result<(), ProbeError>;
}

/// Bounded-time load check.
#[derive(Clone)]
pub struct Probe {
    loader: Arc<dyn SourceLoader>,
    default_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

/// Holds one probe slot; released exactly once on drop, whichever way the
/// probe ends (success, error, timeout or the caller dropping the future).
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Probe {
    #[must_use]
    pub fn new(loader: Arc<dyn SourceLoader>, default_timeout: Duration) -> Self {
        Self {
            loader,
            default_timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Number of load attempts currently holding resources.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn probe(&self, candidate: &PlaybackCandidate) -> bool {
        self.probe_with_timeout(candidate, self.default_timeout).await
    }

    /// `true` only on a load-success signal before `timeout` elapses.
    pub async fn probe_with_timeout(&self, candidate: &PlaybackCandidate, timeout: Duration) -> bool {
        if !candidate.is_loadable() {
            tracing::debug!(uri = %candidate.source_uri, "Candidate is not a network resource");
            return false;
        }

        let _slot = InFlightGuard::acquire(&self.in_flight);
        let outcome = match tokio::time::timeout(timeout, self.loader.load(&candidate.source_uri)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(provider = %candidate.provider, title = %candidate.title, "Probe succeeded");
                true
            }
            Err(e) => {
                tracing::debug!(
                    provider = %candidate.provider,
                    title = %candidate.title,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Probe failed: {e}"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("default_timeout", &self.default_timeout)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Loads a source with a plain GET, the way a browser would fetch an iframe.
#[derive(Debug, Clone)]
pub struct HttpSourceLoader {
    http: reqwest::Client,
}

impl HttpSourceLoader {
    pub fn new(connect_timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ProbeError::Load(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    #[must_use]
    pub const fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceLoader for HttpSourceLoader {
    async fn load(&self, uri: &str) -> Result<(), ProbeError> {
        let url = url::Url::parse(uri).map_err(|e| ProbeError::Load(format!("invalid URI: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProbeError::Load(format!("unsupported scheme: {}", url.scheme())));
        }

        let resp = self
            .http
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| ProbeError::Load(e.to_string()))?;

        let status = resp.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(ProbeError::Load(format!("HTTP {}", status.as_u16())));
        }
        if let Some(reason) = framing_denied(resp.headers()) {
            return Err(ProbeError::Load(reason));
        }
        Ok(())
    }
}

/// Reason an iframe could not render this response, if any.
fn framing_denied(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(X_FRAME_OPTIONS).and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        if value.eq_ignore_ascii_case("deny") || value.eq_ignore_ascii_case("sameorigin") {
            return Some(format!("framing forbidden by X-Frame-Options: {value}"));
        }
    }

    for csp in headers.get_all(CONTENT_SECURITY_POLICY) {
        let Ok(csp) = csp.to_str() else { continue };
        let forbids = csp.split(';').any(|directive| {
            let mut tokens = directive.split_whitespace();
            tokens
                .next()
                .is_some_and(|name| name.eq_ignore_ascii_case("frame-ancestors"))
                && tokens.any(|t| t.eq_ignore_ascii_case("'none'"))
        });
        if forbids {
            return Some("framing forbidden by CSP frame-ancestors 'none'".to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{candidate_at, NeverLoader, ScriptedLoader};
    use reqwest::header::HeaderValue;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_never_hangs() {
        let probe = Probe::new(Arc::new(NeverLoader), Duration::from_secs(15));
        let candidate = candidate_at("https://slow.example/embed/1");

        let start = Instant::now();
        assert!(!probe.probe_with_timeout(&candidate, Duration::from_millis(100)).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
        assert_eq!(probe.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_probe_outcomes_release_slot() {
        let loader = ScriptedLoader::new().fail("https://bad.example/e");
        let probe = Probe::new(Arc::new(loader), Duration::from_secs(1));

        assert!(probe.probe(&candidate_at("https://good.example/e")).await);
        assert_eq!(probe.in_flight(), 0);
        assert!(!probe.probe(&candidate_at("https://bad.example/e")).await);
        assert_eq!(probe.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropped_probe_releases_slot() {
        let probe = Probe::new(Arc::new(NeverLoader), Duration::from_secs(30));
        let candidate = candidate_at("https://slow.example/embed/1");
        {
            let pending = probe.probe(&candidate);
            tokio::pin!(pending);
            let early = tokio::time::timeout(Duration::from_millis(20), &mut pending).await;
            assert!(early.is_err());
            assert_eq!(probe.in_flight(), 1);
        }
        assert_eq!(probe.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_placeholder_fails_without_loading() {
        let loader = Arc::new(ScriptedLoader::new());
        let probe = Probe::new(loader.clone(), Duration::from_secs(1));
        let placeholder = PlaybackCandidate::placeholder("SenpaiPlay", 21, 1);
        assert!(!probe.probe(&placeholder).await);
        assert!(loader.calls().is_empty());
    }

    #[tokio::test]
    async fn test_http_loader_statuses_and_framing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/deny"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-Frame-Options", "DENY"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/csp"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Security-Policy", "default-src 'self'; frame-ancestors 'none'"),
            )
            .mount(&server)
            .await;

        let loader = HttpSourceLoader::new(Duration::from_secs(2)).unwrap();
        assert_eq!(loader.load(&format!("{}/ok", server.uri())).await, Ok(()));
        assert_eq!(
            loader.load(&format!("{}/gone", server.uri())).await,
            Err(ProbeError::Load("HTTP 404".to_string()))
        );
        assert!(loader.load(&format!("{}/deny", server.uri())).await.is_err());
        assert!(loader.load(&format!("{}/csp", server.uri())).await.is_err());
        assert!(loader.load("catalog://21/1").await.is_err());
    }

    #[test]
    fn test_framing_allowed_for_embeddable_pages() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("ALLOW-FROM https://a.example"));
        headers.insert(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("frame-ancestors *; script-src 'none'"),
        );
        assert_eq!(framing_denied(&headers), None);
    }
}
