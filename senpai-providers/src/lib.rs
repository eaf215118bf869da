// Senpai Provider Clients
//
// Pure HTTP client implementations for the upstream services a playback
// session talks to. Nothing here knows about candidates or the fallback
// state machine; callers in senpai-core adapt these clients.
//
// Architecture:
// - api_client: rate-limited, cached request wrapper shared by every client
// - catalog: scraping-backed catalog (search -> episodes -> servers)
// - metadata: AniList GraphQL identity lookups (fallback metadata API)

// Shared foundation
pub mod error;
pub mod cache;
pub mod rate_limit;
pub mod metrics;
pub mod api_client;

// HTTP clients
pub mod catalog;
pub mod metadata;

// Re-export client types for convenience
pub use api_client::{ApiClient, ApiClientConfig, RequestSpec};
pub use cache::{CacheEntry, ResponseCache};
pub use catalog::{CatalogClient, ResolvedCatalogEntry};
pub use error::UpstreamError;
pub use metadata::{MediaIdentity, MetadataClient};
pub use rate_limit::HostRateLimiter;
