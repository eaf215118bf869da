//! End-to-end playback sessions against mocked catalog and embed hosts

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use senpai_core::config::{ClientProfile, EmbedsConfig};
use senpai_core::playback::{
    CatalogResolver, HttpSourceLoader, Phase, Probe, ProviderKind, UpstreamClients,
};
use senpai_core::{Config, PlaybackRequest, PlaybackSession};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.upstream.catalog_base_url = server.uri();
    config.upstream.default_min_interval_ms = 0;
    config.upstream.min_interval_ms = HashMap::new();
    config.playback.retry_delay_ms = 10;
    config.playback.probe_timeout_ms = 2_000;
    config.playback.preload_timeout_ms = 2_000;

    let mut embeds = EmbedsConfig::all_at(&server.uri());
    embeds.megaplay_server_base = format!("{}/mp", server.uri());
    embeds.vidwish_server_base = format!("{}/vw", server.uri());
    config.embeds = embeds;
    config
}

fn session_for(config: &Config, title: &str) -> PlaybackSession {
    let clients = UpstreamClients::from_config(&config.upstream).unwrap();
    let loader = HttpSourceLoader::new(Duration::from_secs(2)).unwrap();
    let catalog: Arc<dyn CatalogResolver> = Arc::new(clients.catalog);

    PlaybackSession::builder(PlaybackRequest::new(21, 1, title).with_mal_id(Some(21)))
        .settings(config.playback.clone())
        .embeds(config.embeds.clone())
        .probe(Probe::new(Arc::new(loader), config.playback.probe_timeout()))
        .catalog(catalog)
        .build()
        .unwrap()
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "internalId": "one-piece-100",
                "title": "One Piece",
                "poster": null,
                "episodeCounts": {"sub": 1100, "dub": 1000}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/episodes/one-piece-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"episodes": [{"id": "2142", "title": "I'm Luffy!", "isFiller": false}]}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/servers/2142"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "sub": [
                    {"name": "VidWish", "quality": "1080p"},
                    {"name": "MegaPlay", "quality": "1080p"}
                ],
                "dub": [{"name": "MegaPlay", "quality": "720p"}]
            }
        })))
        .mount(server)
        .await;
}

async fn mount_direct_embeds(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v2/embed/anime/ani21/\d+/(sub|dub)$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>vidsrc</html>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_all_catalog_servers_fail_then_fallback() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_direct_embeds(&server).await;

    // MegaPlay is down, VidWish refuses to be framed
    Mock::given(method("GET"))
        .and(path_regex(r"^/mp/stream/s-2/2142/(sub|dub)$"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/vw/stream/s-2/2142/(sub|dub)$"))
        .respond_with(ResponseTemplate::new(200).insert_header("X-Frame-Options", "SAMEORIGIN"))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = session_for(&config, "One Piece");
    session.run().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, Phase::Exhausted);
    assert!(snapshot.exhausted);
    assert!(!snapshot.locked);
    assert!(!snapshot.is_loading_catalog);

    // Catalog tier first in priority order, placeholder gone
    let catalog: Vec<&str> = snapshot
        .candidates
        .iter()
        .filter(|c| c.provider.is_catalog())
        .map(|c| c.title.as_str())
        .collect();
    assert_eq!(
        catalog,
        vec![
            "SenpaiPlay Sub MegaPlay 1080p",
            "SenpaiPlay Sub VidWish 1080p",
            "SenpaiPlay Dub MegaPlay 720p",
        ]
    );

    let active = &snapshot.candidates[snapshot.current_index];
    assert_eq!(active.provider, ProviderKind::Vidsrc);
    assert_eq!(snapshot.current_index, 3);
    assert_eq!(snapshot.active_uri.as_deref(), Some(active.source_uri.as_str()));
    assert!(active
        .source_uri
        .ends_with("/v2/embed/anime/ani21/1/sub?autoPlay=true&autoSkipIntro=true"));
}

#[tokio::test]
async fn test_locks_on_first_working_server() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_direct_embeds(&server).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/mp/stream/s-2/2142/sub$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/vw/stream/s-2/2142/sub$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>vidwish</html>"))
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = session_for(&config, "One Piece");
    session.run().await;
    session.wait_for_preload().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, Phase::Locked);
    assert!(snapshot.locked);
    assert_eq!(snapshot.current_index, 1);
    assert_eq!(snapshot.candidates[1].server_label, "VidWish");
    // Nothing left in the sub tier after the locked candidate
    assert!(snapshot.preloaded.is_empty());
}

#[tokio::test]
async fn test_catalog_without_match_uses_direct_embeds() {
    let server = MockServer::start().await;
    mount_direct_embeds(&server).await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&server);
    let session = session_for(&config, "One Piece");
    session.run().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.phase, Phase::Exhausted);
    assert_eq!(snapshot.current_index, 0);
    assert_eq!(snapshot.candidates[0].provider, ProviderKind::Vidsrc);
    assert!(session
        .events()
        .recent()
        .iter()
        .any(|e| e.message == "No catalog match"));
}

#[tokio::test]
async fn test_manual_switch_then_next_episode() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    mount_direct_embeds(&server).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(mp|vw)/stream/s-2/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.playback.client_profile = ClientProfile::Mobile;
    let session = session_for(&config, "One Piece");
    session.run().await;
    assert_eq!(session.snapshot().phase, Phase::Locked);

    let picked = session.select_candidate(4).unwrap();
    assert!(picked.manual_override);
    assert_eq!(picked.active_uri.as_deref(), Some(picked.candidates[4].source_uri.as_str()));

    // The new episode has no catalog entry yet, so it falls back
    let reset = session.change_episode(2).unwrap();
    assert!(!reset.manual_override);
    assert_eq!(reset.phase, Phase::Idle);
    session.run().await;
    let snapshot = session.snapshot();
    assert_eq!(snapshot.episode, 2);
    assert_eq!(snapshot.candidates[snapshot.current_index].provider, ProviderKind::Vidsrc);
}
