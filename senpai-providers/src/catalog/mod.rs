//! Scraping-backed catalog provider
//!
//! Resolves an external (AniList) id to the catalog's internal id, episode
//! list and per-episode server list.

pub mod client;
pub mod types;

pub use client::{CatalogClient, CatalogTtls, CATALOG_HOST};
pub use types::{
    sort_servers, CatalogEpisode, CatalogMatch, CatalogServer, EpisodeCounts, Language, Quality,
    ResolvedCatalogEntry, SERVER_PRIORITY,
};
