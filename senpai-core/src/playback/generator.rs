//! Candidate generation
//!
//! Pure transforms: string templating over configured host bases, no I/O, no
//! hidden state. Calling either generator twice with the same inputs yields
//! identical output.

use senpai_providers::catalog::{CatalogServer, Language, Quality, ResolvedCatalogEntry};

use super::candidate::{PlaybackCandidate, ProviderKind};
use super::slug::slugify;
use crate::config::EmbedsConfig;

/// Identifiers available when the static list is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaIds {
    pub anilist_id: u64,
    pub mal_id: Option<u64>,
}

/// Order of the language tiers, preferred first.
fn language_order(preferred: Language) -> [Language; 2] {
    match preferred {
        Language::Dub => [Language::Dub, Language::Sub],
        Language::Sub | Language::Both => [Language::Sub, Language::Dub],
    }
}

fn base(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Static candidates known before any catalog call: the catalog placeholder
/// followed by every direct-embed host (vidsrc, megaplay, videasy, vidlink,
/// 2anime), each language-aware host once per language.
#[must_use]
pub fn generate_static_candidates(
    ids: MediaIds,
    episode: u32,
    title: &str,
    start_offset: Option<u32>,
    preferred: Language,
    embeds: &EmbedsConfig,
) -> Vec<PlaybackCandidate> {
    let languages = language_order(preferred);
    let id = ids.anilist_id;
    let mut candidates = vec![PlaybackCandidate::placeholder(&embeds.brand, id, episode)];

    let start = start_offset.filter(|s| *s > 0);

    for language in languages {
        let mut uri = format!(
            "{}/v2/embed/anime/ani{id}/{episode}/{language}?autoPlay=true&autoSkipIntro=true",
            base(&embeds.vidsrc_base)
        );
        if let Some(start) = start {
            uri.push_str(&format!("&startAt={start}"));
        }
        candidates.push(direct(ProviderKind::Vidsrc, "VidSrc", language, uri));
    }

    for language in languages {
        let uri = format!("{}/stream/ani/{id}/{episode}/{language}", base(&embeds.megaplay_base));
        candidates.push(direct(ProviderKind::MegaPlay, "MegaPlay", language, uri));
    }

    for language in languages {
        let mut uri = format!(
            "{}/anime/{id}/{episode}?dub={}&nextEpisode=true&autoplayNextEpisode=true&episodeSelector=false",
            base(&embeds.videasy_base),
            language == Language::Dub
        );
        if let Some(start) = start {
            uri.push_str(&format!("&progress={start}"));
        }
        candidates.push(direct(ProviderKind::Videasy, "Videasy", language, uri));
    }

    if let Some(mal_id) = ids.mal_id {
        for language in languages {
            let uri = format!(
                "{}/anime/{mal_id}/{episode}/{language}?fallback=true",
                base(&embeds.vidlink_base)
            );
            candidates.push(direct(ProviderKind::Vidlink, "VidLink", language, uri));
        }
    }

    let slug = slugify(title);
    if !slug.is_empty() {
        let uri = format!("{}/embed/{slug}-episode-{episode}", base(&embeds.twoanime_base));
        candidates.push(direct(ProviderKind::TwoAnime, "2Anime", Language::Both, uri));
    }

    candidates
}

fn direct(provider: ProviderKind, name: &str, language: Language, source_uri: String) -> PlaybackCandidate {
    let title = match language {
        Language::Both => name.to_string(),
        _ => format!("{name} {}", language.label()),
    };
    PlaybackCandidate {
        title,
        source_uri,
        provider,
        language,
        quality: Quality::Unknown,
        server_label: provider.as_str().to_string(),
        recommended: false,
    }
}

/// Embed URI for a catalog server label, if the label has a known host.
fn catalog_server_uri(server: &CatalogServer, episode_id: &str, embeds: &EmbedsConfig) -> Option<String> {
    let host = if server.label.eq_ignore_ascii_case("MegaPlay") {
        &embeds.megaplay_server_base
    } else if server.label.eq_ignore_ascii_case("VidWish") {
        &embeds.vidwish_server_base
    } else {
        return None;
    };
    Some(format!("{}/stream/s-2/{episode_id}/{}", base(host), server.language))
}

/// Catalog candidates from a resolved entry, preferred language tier first.
///
/// Within a tier the entry's server order (priority, then quality
/// descending) is kept. Servers without a known host are dropped.
#[must_use]
pub fn generate_catalog_candidates(
    entry: &ResolvedCatalogEntry,
    preferred: Language,
    embeds: &EmbedsConfig,
) -> Vec<PlaybackCandidate> {
    let mut candidates = Vec::with_capacity(entry.servers.len());

    for language in language_order(preferred) {
        for server in entry.servers_for(language) {
            let Some(source_uri) = catalog_server_uri(server, &entry.episode_id, embeds) else {
                tracing::debug!(server = %server.label, "No embed host for catalog server, skipping");
                continue;
            };
            candidates.push(PlaybackCandidate {
                title: format!(
                    "{} {} {} {}",
                    embeds.brand,
                    language.label(),
                    server.label,
                    server.quality
                ),
                source_uri,
                provider: ProviderKind::Catalog,
                language,
                quality: server.quality,
                server_label: server.label.clone(),
                recommended: false,
            });
        }
    }

    if let Some(first) = candidates.first_mut() {
        if first.language == language_order(preferred)[0] {
            first.recommended = true;
        }
    }

    candidates
}
