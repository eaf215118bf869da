//! Playback resolution
//!
//! - candidate / generator / slug: what can be played
//! - probe: whether a candidate actually loads
//! - state / orchestrator: walking the priority chain
//! - preloader: warming the rest of the locked tier

pub mod candidate;
pub mod generator;
pub mod orchestrator;
pub mod preloader;
pub mod probe;
pub mod resolver;
pub mod slug;
pub mod state;

pub use candidate::{PlaybackCandidate, ProviderKind, PLACEHOLDER_SCHEME};
pub use generator::{generate_catalog_candidates, generate_static_candidates, MediaIds};
pub use orchestrator::{PlaybackRequest, PlaybackSession, PlaybackSessionBuilder};
pub use preloader::{preload, PreloadReport};
pub use probe::{HttpSourceLoader, Probe, SourceLoader};
pub use resolver::{CatalogResolver, MetadataLookup, UpstreamClients};
pub use slug::slugify;
pub use state::{FallbackState, Phase, PlaybackSnapshot, Step};
