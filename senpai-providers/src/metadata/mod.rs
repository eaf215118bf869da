//! Fallback metadata provider (AniList GraphQL)
//!
//! Used only to fill in identifiers the catalog search can use as secondary
//! keys (MAL id, romaji title) when the caller did not supply them.

pub mod client;
pub mod types;

pub use client::{MetadataClient, ANILIST_HOST, DEFAULT_METADATA_URL};
pub use types::{MediaIdentity, MediaTitle};
