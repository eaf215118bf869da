//! Senpai playback core
//!
//! Turns `{externalId, malId?, episode, title}` into a playing source by
//! walking a prioritised chain of catalog and direct-embed candidates.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod playback;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, ProbeError, Result};
pub use events::{Event, EventLevel, EventLog};
pub use playback::{PlaybackRequest, PlaybackSession, PlaybackSnapshot};
