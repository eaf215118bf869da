//! AniList GraphQL response types

use serde::{Deserialize, Serialize};

/// Media titles as AniList returns them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
}

/// The identity fields of one AniList media entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaIdentity {
    pub id: u64,
    #[serde(default)]
    pub id_mal: Option<u64>,
    #[serde(default)]
    pub title: MediaTitle,
    /// Total episode count, unknown for airing shows.
    #[serde(default)]
    pub episodes: Option<u32>,
}

impl MediaIdentity {
    /// Title to use as a search hint: English first, then romaji.
    #[must_use]
    pub fn display_title(&self) -> Option<&str> {
        non_blank(self.title.english.as_deref()).or_else(|| non_blank(self.title.romaji.as_deref()))
    }
}

fn non_blank(title: Option<&str>) -> Option<&str> {
    title.map(str::trim).filter(|t| !t.is_empty())
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct MediaData {
    pub media: Option<MediaIdentity>,
}
