//! Catalog wire types and resolved domain types

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// Upstream server names in declared priority order (case-insensitive).
pub const SERVER_PRIORITY: &[&str] = &["MegaPlay", "VidWish", "HD-1", "HD-2"];

/// Audio/subtitle track of a candidate or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Sub,
    Dub,
    Both,
}

impl Language {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sub => "sub",
            Self::Dub => "dub",
            Self::Both => "both",
        }
    }

    /// Title-case label used in display titles.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sub => "Sub",
            Self::Dub => "Dub",
            Self::Both => "Sub/Dub",
        }
    }

    /// The other single-track language (`Both` has none).
    #[must_use]
    pub const fn other(&self) -> Option<Self> {
        match self {
            Self::Sub => Some(Self::Dub),
            Self::Dub => Some(Self::Sub),
            Self::Both => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sub" | "subbed" => Ok(Self::Sub),
            "dub" | "dubbed" => Ok(Self::Dub),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown language track: {other}")),
        }
    }
}

/// Ordinal quality label. Declaration order is ascending, so `Ord` ranks
/// 1080p highest and `Unknown` lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Quality {
    /// Parse labels such as `1080p`, `1080`, `HD 720P` or `FHD`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("1080") || lower.contains("fhd") {
            Self::P1080
        } else if lower.contains("720") {
            Self::P720
        } else if lower.contains("480") {
            Self::P480
        } else if lower.contains("360") {
            Self::P360
        } else {
            Self::Unknown
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::P360 => "360p",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One server offered by the catalog for a specific episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogServer {
    pub label: String,
    pub language: Language,
    pub quality: Quality,
}

impl CatalogServer {
    /// Index into [`SERVER_PRIORITY`]; unknown names rank after every known one.
    #[must_use]
    pub fn priority(&self) -> usize {
        SERVER_PRIORITY
            .iter()
            .position(|name| name.eq_ignore_ascii_case(self.label.trim()))
            .unwrap_or(SERVER_PRIORITY.len())
    }
}

/// Sort servers by provider priority, then quality descending. Stable, so
/// equal keys keep their upstream order.
pub fn sort_servers(servers: &mut [CatalogServer]) {
    servers.sort_by_key(|s| (s.priority(), Reverse(s.quality)));
}

/// Stage 1 result: the catalog's own identity for a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogMatch {
    #[serde(deserialize_with = "string_or_number")]
    pub internal_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub episode_counts: Option<EpisodeCounts>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeCounts {
    #[serde(default)]
    pub sub: Option<u32>,
    #[serde(default)]
    pub dub: Option<u32>,
}

/// Stage 2 list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEpisode {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_filler: bool,
}

/// Output of the three-stage resolution. Never mutated; re-resolution
/// replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCatalogEntry {
    pub internal_id: String,
    pub episode_id: String,
    /// Sorted by provider priority then quality descending, per language.
    pub servers: Vec<CatalogServer>,
}

impl ResolvedCatalogEntry {
    /// Servers of one language track, in priority order.
    pub fn servers_for(&self, language: Language) -> impl Iterator<Item = &CatalogServer> {
        self.servers.iter().filter(move |s| s.language == language)
    }
}

/// Common `{success, data, message}` envelope used by every catalog endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EpisodesData {
    #[serde(default)]
    pub episodes: Vec<CatalogEpisode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServersData {
    #[serde(default)]
    pub sub: Vec<ServerEntry>,
    #[serde(default)]
    pub dub: Vec<ServerEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServerEntry {
    pub name: String,
    #[serde(default)]
    pub quality: Option<String>,
}

impl ServersData {
    pub(crate) fn into_servers(self) -> Vec<CatalogServer> {
        let tagged = |entries: Vec<ServerEntry>, language: Language| {
            entries.into_iter().map(move |entry| CatalogServer {
                label: entry.name.trim().to_string(),
                language,
                quality: entry.quality.as_deref().map_or(Quality::Unknown, Quality::parse),
            })
        };
        tagged(self.sub, Language::Sub)
            .chain(tagged(self.dub, Language::Dub))
            .collect()
    }
}

/// Catalog ids arrive as either strings or numbers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(label: &str, quality: Quality) -> CatalogServer {
        CatalogServer {
            label: label.to_string(),
            language: Language::Sub,
            quality,
        }
    }

    #[test]
    fn test_sort_priority_then_quality() {
        let mut servers = vec![
            server("MegaPlay", Quality::P480),
            server("VidWish", Quality::P1080),
            server("MegaPlay", Quality::P1080),
        ];
        sort_servers(&mut servers);

        let order: Vec<(&str, Quality)> =
            servers.iter().map(|s| (s.label.as_str(), s.quality)).collect();
        assert_eq!(
            order,
            vec![
                ("MegaPlay", Quality::P1080),
                ("MegaPlay", Quality::P480),
                ("VidWish", Quality::P1080),
            ]
        );
    }

    #[test]
    fn test_unknown_servers_sort_last() {
        let mut servers = vec![
            server("StreamTape", Quality::P1080),
            server("hd-2", Quality::P360),
            server("vidwish", Quality::Unknown),
        ];
        sort_servers(&mut servers);
        assert_eq!(servers[0].label, "vidwish");
        assert_eq!(servers[1].label, "hd-2");
        assert_eq!(servers[2].label, "StreamTape");
    }

    #[test]
    fn test_quality_parse_and_order() {
        assert_eq!(Quality::parse("1080p"), Quality::P1080);
        assert_eq!(Quality::parse("HD 720P"), Quality::P720);
        assert_eq!(Quality::parse("480"), Quality::P480);
        assert_eq!(Quality::parse("360p"), Quality::P360);
        assert_eq!(Quality::parse("auto"), Quality::Unknown);
        assert!(Quality::P1080 > Quality::P720);
        assert!(Quality::P360 > Quality::Unknown);
    }

    #[test]
    fn test_language_parse() {
        assert_eq!("sub".parse::<Language>(), Ok(Language::Sub));
        assert_eq!("DUB".parse::<Language>(), Ok(Language::Dub));
        assert!("raw".parse::<Language>().is_err());
        assert_eq!(Language::Sub.other(), Some(Language::Dub));
        assert_eq!(Language::Both.other(), None);
    }

    #[test]
    fn test_servers_data_flattening() {
        let data: ServersData = serde_json::from_value(serde_json::json!({
            "sub": [{"name": "MegaPlay", "quality": "1080p"}, {"name": "VidWish"}],
            "dub": [{"name": "MegaPlay", "quality": "720p"}]
        }))
        .unwrap();
        let servers = data.into_servers();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[1].quality, Quality::Unknown);
        assert_eq!(servers[2].language, Language::Dub);
    }

    #[test]
    fn test_ids_accept_numbers() {
        let episode: CatalogEpisode =
            serde_json::from_value(serde_json::json!({"id": 2142, "title": "Ep 1", "isFiller": false}))
                .unwrap();
        assert_eq!(episode.id, "2142");

        let found: CatalogMatch = serde_json::from_value(serde_json::json!({
            "internalId": "one-piece-100",
            "title": "One Piece",
            "poster": null,
            "episodeCounts": {"sub": 1100, "dub": 1000}
        }))
        .unwrap();
        assert_eq!(found.internal_id, "one-piece-100");
        assert_eq!(found.episode_counts.and_then(|c| c.sub), Some(1100));
    }
}
