//! Catalog HTTP Client
//!
//! Three sequential upstream calls, each cached independently:
//! search (external id → internal id), episodes (internal id → episode list),
//! servers (episode id → per-language server list).

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use url::Url;

use super::types::{
    sort_servers, CatalogEpisode, CatalogMatch, CatalogServer, Envelope, EpisodesData,
    ResolvedCatalogEntry, ServersData,
};
use crate::api_client::{ApiClient, RequestSpec};
use crate::error::{check_response, json_with_limit, UpstreamError};

/// Logical host name used for rate limiting and metrics.
pub const CATALOG_HOST: &str = "catalog";

/// Cache lifetimes for each stage.
#[derive(Debug, Clone, Copy)]
pub struct CatalogTtls {
    pub search: Duration,
    pub episodes: Duration,
    pub servers: Duration,
}

impl Default for CatalogTtls {
    fn default() -> Self {
        Self {
            search: Duration::from_secs(600),
            episodes: Duration::from_secs(300),
            servers: Duration::from_secs(300),
        }
    }
}

/// Catalog HTTP Client
#[derive(Debug, Clone)]
pub struct CatalogClient {
    api: ApiClient,
    base_url: Url,
    ttls: CatalogTtls,
}

impl CatalogClient {
    pub fn new(api: ApiClient, base_url: &str, ttls: CatalogTtls) -> Result<Self, UpstreamError> {
        let mut base_url = Url::parse(base_url.trim())
            .map_err(|e| UpstreamError::Other(format!("invalid catalog base url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::Other(format!("catalog base url cannot be a base: {base_url}")));
        }
        // Normalise so that joined segments append rather than replace
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { api, base_url, ttls })
    }

    /// `{base}/{segment}/{id}` with `id` percent-encoded as one path segment.
    fn endpoint(&self, segment: &str, id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url
    }

    /// Stage 1: find the catalog's internal id for an external id.
    ///
    /// `Ok(None)` means the catalog has no match, which is an expected outcome.
    pub async fn search(
        &self,
        external_id: u64,
        alt_id: Option<u64>,
        title: Option<&str>,
    ) -> Result<Option<CatalogMatch>, UpstreamError> {
        let url = self.endpoint("search", None);

        let mut body = json!({ "externalId": external_id });
        if let Some(mal_id) = alt_id {
            body["malId"] = json!(mal_id);
        }
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            body["title"] = json!(title);
        }

        let spec = RequestSpec::new(
            CATALOG_HOST,
            "catalog.search",
            json!({ "externalId": external_id, "altId": alt_id }),
        )
        .cached(self.ttls.search);

        self.api
            .request(spec, |http| async move {
                let resp = http.post(url).json(&body).send().await?;
                if resp.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let resp = check_response(resp).await?;
                let envelope: Envelope<CatalogMatch> = json_with_limit(resp).await?;
                unwrap_envelope(envelope)
            })
            .await
    }

    /// Stage 2: the full episode list. An empty list is valid.
    pub async fn episodes(&self, internal_id: &str) -> Result<Vec<CatalogEpisode>, UpstreamError> {
        let url = self.endpoint("episodes", Some(internal_id));
        let spec = RequestSpec::new(CATALOG_HOST, "catalog.episodes", json!({ "internalId": internal_id }))
            .cached(self.ttls.episodes);

        self.api
            .request(spec, |http| async move {
                let resp = check_response(http.get(url).send().await?).await?;
                let envelope: Envelope<EpisodesData> = json_with_limit(resp).await?;
                Ok(unwrap_envelope(envelope)?.map(|d| d.episodes).unwrap_or_default())
            })
            .await
    }

    /// Stage 3: servers for one episode, flattened across language tracks.
    pub async fn servers(&self, episode_id: &str) -> Result<Vec<CatalogServer>, UpstreamError> {
        let url = self.endpoint("servers", Some(episode_id));
        let spec = RequestSpec::new(CATALOG_HOST, "catalog.servers", json!({ "episodeId": episode_id }))
            .cached(self.ttls.servers);

        self.api
            .request(spec, |http| async move {
                let resp = check_response(http.get(url).send().await?).await?;
                let envelope: Envelope<ServersData> = json_with_limit(resp).await?;
                Ok(unwrap_envelope(envelope)?
                    .map(ServersData::into_servers)
                    .unwrap_or_default())
            })
            .await
    }

    /// Run all three stages for one episode (1-based).
    ///
    /// "Not found" at any stage resolves to `Ok(None)`; any other error aborts
    /// this attempt and is returned to the caller.
    pub async fn resolve(
        &self,
        external_id: u64,
        episode: u32,
        fallback_title: Option<&str>,
        alt_id: Option<u64>,
    ) -> Result<Option<ResolvedCatalogEntry>, UpstreamError> {
        match self.resolve_inner(external_id, episode, fallback_title, alt_id).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(external_id, episode, "Catalog has no entry: {e}");
                Ok(None)
            }
            other => other,
        }
    }

    async fn resolve_inner(
        &self,
        external_id: u64,
        episode: u32,
        fallback_title: Option<&str>,
        alt_id: Option<u64>,
    ) -> Result<Option<ResolvedCatalogEntry>, UpstreamError> {
        let Some(found) = self.search(external_id, alt_id, fallback_title).await? else {
            tracing::debug!(external_id, "Catalog search returned no match");
            return Ok(None);
        };

        let episodes = self.episodes(&found.internal_id).await?;
        let Some(target) = episode
            .checked_sub(1)
            .and_then(|i| episodes.get(i as usize))
        else {
            tracing::debug!(
                internal_id = %found.internal_id,
                episode,
                available = episodes.len(),
                "Episode not available in catalog yet"
            );
            return Ok(None);
        };

        let mut servers = self.servers(&target.id).await?;
        sort_servers(&mut servers);

        tracing::debug!(
            internal_id = %found.internal_id,
            episode_id = %target.id,
            servers = servers.len(),
            "Catalog entry resolved"
        );

        Ok(Some(ResolvedCatalogEntry {
            internal_id: found.internal_id,
            episode_id: target.id.clone(),
            servers,
        }))
    }
}

/// `success: false` carries a message that may hold a wire prefix; a
/// not-found message is an empty result rather than an error.
fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<Option<T>, UpstreamError> {
    if envelope.success {
        return Ok(envelope.data);
    }
    let message = envelope
        .message
        .unwrap_or_else(|| "catalog reported failure without a message".to_string());
    match UpstreamError::from_wire(&message) {
        UpstreamError::NotFound(_) => Ok(None),
        other => Err(other),
    }
}
