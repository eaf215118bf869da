//! Playback candidate model

use serde::{Deserialize, Serialize};
use std::fmt;

use senpai_providers::catalog::{Language, Quality};

/// URI scheme of the catalog placeholder entry.
pub const PLACEHOLDER_SCHEME: &str = "catalog://";

/// Where a candidate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Scraping-backed catalog; the only provider walked by the automatic chain
    Catalog,
    Vidsrc,
    #[serde(rename = "megaplay")]
    MegaPlay,
    Videasy,
    /// Keyed by MAL id, which usually comes from the metadata fallback
    Vidlink,
    #[serde(rename = "2anime")]
    TwoAnime,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Vidsrc => "vidsrc",
            Self::MegaPlay => "megaplay",
            Self::Videasy => "videasy",
            Self::Vidlink => "vidlink",
            Self::TwoAnime => "2anime",
        }
    }

    #[must_use]
    pub const fn is_catalog(&self) -> bool {
        matches!(self, Self::Catalog)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "catalog" => Ok(Self::Catalog),
            "vidsrc" => Ok(Self::Vidsrc),
            "megaplay" => Ok(Self::MegaPlay),
            "videasy" => Ok(Self::Videasy),
            "vidlink" => Ok(Self::Vidlink),
            "2anime" | "twoanime" => Ok(Self::TwoAnime),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// One offer to play a specific episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCandidate {
    pub title: String,
    pub source_uri: String,
    pub provider: ProviderKind,
    pub language: Language,
    pub quality: Quality,
    /// Upstream server behind the provider; used for dedup and priority
    pub server_label: String,
    /// Advisory only, never affects ordering
    pub recommended: bool,
}

impl PlaybackCandidate {
    /// The stand-in for catalog candidates that are not known yet.
    #[must_use]
    pub fn placeholder(brand: &str, external_id: u64, episode: u32) -> Self {
        Self {
            title: format!("{brand} (resolving)"),
            source_uri: format!("{PLACEHOLDER_SCHEME}{external_id}/{episode}"),
            provider: ProviderKind::Catalog,
            language: Language::Both,
            quality: Quality::Unknown,
            server_label: String::new(),
            recommended: false,
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.source_uri.starts_with(PLACEHOLDER_SCHEME)
    }

    /// Whether `source_uri` points at a loadable network resource.
    #[must_use]
    pub fn is_loadable(&self) -> bool {
        url::Url::parse(&self.source_uri)
            .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
    }

    /// Member of the automatic probe chain.
    #[must_use]
    pub fn in_catalog_chain(&self) -> bool {
        self.provider.is_catalog() && !self.is_placeholder()
    }
}
