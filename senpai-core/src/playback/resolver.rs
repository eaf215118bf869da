//! Upstream seams used by the orchestrator
//!
//! The orchestrator depends on these traits rather than on the concrete
//! clients, so sessions can run against stubs in tests.

use async_trait::async_trait;

use senpai_providers::catalog::{CatalogClient, ResolvedCatalogEntry};
use senpai_providers::metadata::{MediaIdentity, MetadataClient};
use senpai_providers::{ApiClient, UpstreamError};

use crate::config::UpstreamConfig;

/// Three-stage catalog resolution.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    async fn resolve(
        &self,
        external_id: u64,
        episode: u32,
        fallback_title: Option<&str>,
        alt_id: Option<u64>,
    ) -> Result<Option<ResolvedCatalogEntry>, UpstreamError>;
}

/// Identity lookup on the fallback metadata API.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn media_identity(&self, anilist_id: u64) -> Result<MediaIdentity, UpstreamError>;
}

#[async_trait]
impl CatalogResolver for CatalogClient {
    async fn resolve(
        &self,
        external_id: u64,
        episode: u32,
        fallback_title: Option<&str>,
        alt_id: Option<u64>,
    ) -> Result<Option<ResolvedCatalogEntry>, UpstreamError> {
        CatalogClient::resolve(self, external_id, episode, fallback_title, alt_id).await
    }
}

#[async_trait]
impl MetadataLookup for MetadataClient {
    async fn media_identity(&self, anilist_id: u64) -> Result<MediaIdentity, UpstreamError> {
        MetadataClient::media_identity(self, anilist_id).await
    }
}

/// Catalog and metadata clients sharing one rate limiter and response cache.
#[derive(Debug, Clone)]
pub struct UpstreamClients {
    pub catalog: CatalogClient,
    pub metadata: MetadataClient,
}

impl UpstreamClients {
    pub fn from_config(config: &UpstreamConfig) -> crate::Result<Self> {
        let api = ApiClient::new(&config.api_client_config())?;
        let catalog = CatalogClient::new(api.clone(), &config.catalog_base_url, config.catalog_ttls())?;
        let metadata = MetadataClient::new(api, config.metadata_url.trim(), config.metadata_ttl());
        Ok(Self { catalog, metadata })
    }
}
