//! Fallback orchestrator
//!
//! Drives one playback view: resolves catalog candidates, walks the catalog
//! chain one probe at a time, locks on the first candidate that loads,
//! and otherwise falls back to the always-available provider. All decisions
//! are made by [`FallbackState`]; this module only performs the I/O it asks
//! for and publishes snapshots.
//!
//! Cancellation is cooperative. Each generation (one episode) owns a
//! `CancellationToken`; a child "automation" token covers probes, the
//! inter-attempt delay and the preloader. A manual selection cancels the
//! automation token, an episode change cancels the whole generation.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use senpai_providers::catalog::ResolvedCatalogEntry;

use super::candidate::PlaybackCandidate;
use super::generator::{generate_catalog_candidates, generate_static_candidates, MediaIds};
use super::preloader::preload;
use super::probe::{HttpSourceLoader, Probe};
use super::resolver::{CatalogResolver, MetadataLookup};
use super::state::{FallbackState, Phase, PlaybackSnapshot, Step};
use crate::config::{EmbedsConfig, PlaybackConfig};
use crate::error::{Error, Result};
use crate::events::{EventLevel, EventLog, DEFAULT_EVENT_CAPACITY};

/// What the UI layer asks to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    /// AniList id
    pub external_id: u64,
    pub mal_id: Option<u64>,
    /// 1-based
    pub episode: u32,
    pub title: String,
    /// Resume position in seconds
    pub start_offset: Option<u32>,
}

impl PlaybackRequest {
    #[must_use]
    pub fn new(external_id: u64, episode: u32, title: impl Into<String>) -> Self {
        Self {
            external_id,
            mal_id: None,
            episode,
            title: title.into(),
            start_offset: None,
        }
    }

    #[must_use]
    pub fn with_mal_id(mut self, mal_id: Option<u64>) -> Self {
        self.mal_id = mal_id;
        self
    }

    #[must_use]
    pub fn with_start_offset(mut self, seconds: Option<u32>) -> Self {
        self.start_offset = seconds;
        self
    }

    const fn ids(&self) -> MediaIds {
        MediaIds {
            anilist_id: self.external_id,
            mal_id: self.mal_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Tokens {
    generation: CancellationToken,
    automation: CancellationToken,
}

impl Tokens {
    fn new() -> Self {
        let generation = CancellationToken::new();
        let automation = generation.child_token();
        Self { generation, automation }
    }
}

struct SessionState {
    fsm: FallbackState,
    request: PlaybackRequest,
    tokens: Tokens,
}

struct Inner {
    settings: PlaybackConfig,
    embeds: EmbedsConfig,
    probe: Probe,
    catalog: Option<Arc<dyn CatalogResolver>>,
    metadata: Option<Arc<dyn MetadataLookup>>,
    events: EventLog,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    preload_task: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`PlaybackSession`].
pub struct PlaybackSessionBuilder {
    request: PlaybackRequest,
    settings: PlaybackConfig,
    embeds: EmbedsConfig,
    probe: Option<Probe>,
    catalog: Option<Arc<dyn CatalogResolver>>,
    metadata: Option<Arc<dyn MetadataLookup>>,
    event_capacity: usize,
}

impl PlaybackSessionBuilder {
    #[must_use]
    pub fn settings(mut self, settings: PlaybackConfig) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn embeds(mut self, embeds: EmbedsConfig) -> Self {
        self.embeds = embeds;
        self
    }

    #[must_use]
    pub fn probe(mut self, probe: Probe) -> Self {
        self.probe = Some(probe);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn CatalogResolver>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: Arc<dyn MetadataLookup>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Without an explicit probe, sources are checked with [`HttpSourceLoader`].
    pub fn build(self) -> Result<PlaybackSession> {
        let request = self.request;
        if request.episode == 0 {
            return Err(Error::InvalidInput("episode numbers start at 1".to_string()));
        }

        let probe = match self.probe {
            Some(probe) => probe,
            None => {
                let loader = HttpSourceLoader::new(self.settings.probe_timeout())
                    .map_err(|e| Error::Config(e.to_string()))?;
                Probe::new(Arc::new(loader), self.settings.probe_timeout())
            }
        };

        let candidates = generate_static_candidates(
            request.ids(),
            request.episode,
            &request.title,
            request.start_offset,
            self.settings.preferred_language,
            &self.embeds,
        );
        let fsm = FallbackState::new(request.episode, candidates, self.settings.fallback_provider);
        let (snapshots, _) = watch::channel(fsm.snapshot());
        let events = EventLog::new(format!("ani{}", request.external_id), self.event_capacity);

        Ok(PlaybackSession {
            inner: Arc::new(Inner {
                settings: self.settings,
                embeds: self.embeds,
                probe,
                catalog: self.catalog,
                metadata: self.metadata,
                events,
                state: Mutex::new(SessionState {
                    fsm,
                    request,
                    tokens: Tokens::new(),
                }),
                snapshots,
                preload_task: Mutex::new(None),
            }),
        })
    }
}

/// One playback view. Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<Inner>,
}

impl PlaybackSession {
    #[must_use]
    pub fn builder(request: PlaybackRequest) -> PlaybackSessionBuilder {
        PlaybackSessionBuilder {
            request,
            settings: PlaybackConfig::default(),
            embeds: EmbedsConfig::default(),
            probe: None,
            catalog: None,
            metadata: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Drive the automatic phase on a background task.
    pub fn start(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.run().await })
    }

    /// Drive the automatic phase of the current generation to completion
    /// (locked, fallback selected, unavailable, or cancelled). A generation
    /// is driven at most once; later calls return immediately.
    pub async fn run(&self) {
        let (generation, tokens, request) = {
            let mut state = self.inner.state.lock();
            if state.fsm.phase() != Phase::Idle || state.fsm.manual_override() {
                return;
            }
            state.fsm.begin_resolution();
            (state.fsm.generation(), state.tokens.clone(), state.request.clone())
        };
        self.publish();

        let catalog = tokio::select! {
            () = tokens.generation.cancelled() => return,
            catalog = self.resolve_catalog(&request) => catalog,
        };

        let (chain, step) = {
            let mut state = self.inner.state.lock();
            let merged = state.fsm.extend_with_catalog(generation, catalog);
            let chain: Option<Vec<String>> = merged
                .then(|| state.fsm.candidates().iter().map(|c| c.title.clone()).collect());
            (chain, state.fsm.begin(generation))
        };
        self.publish();
        if let Some(chain) = chain {
            self.log_chain_once(&request, &chain);
        }

        self.drive(generation, &tokens, step).await;
    }

    async fn drive(&self, generation: u64, tokens: &Tokens, mut step: Step) {
        loop {
            match step {
                Step::Probe(index) => {
                    let Some(candidate) = self.candidate(index) else { return };
                    tracing::debug!(index, generation, provider = %candidate.provider, "Probing candidate");

                    let loaded = tokio::select! {
                        () = tokens.automation.cancelled() => return,
                        loaded = self.inner.probe.probe(&candidate) => loaded,
                    };
                    step = self.inner.state.lock().fsm.record_probe(generation, index, loaded);

                    if let Step::Probe(next) = step {
                        self.inner.events.log(
                            EventLevel::Info,
                            "Candidate failed, advancing",
                            json!({ "failed": index, "next": next, "title": candidate.title }),
                        );
                        self.publish();
                        tokio::select! {
                            () = tokens.automation.cancelled() => return,
                            () = tokio::time::sleep(self.inner.settings.retry_delay()) => {}
                        }
                    }
                }
                Step::Locked(index) => {
                    self.publish();
                    if let Some(candidate) = self.candidate(index) {
                        self.inner.events.info(
                            "Candidate locked",
                            json!({ "index": index, "title": candidate.title, "uri": candidate.source_uri }),
                        );
                    }
                    self.spawn_preloader(generation, index, tokens.automation.clone());
                    return;
                }
                Step::Fallback(index) => {
                    self.publish();
                    let Some(candidate) = self.candidate(index) else { return };
                    self.inner.events.info(
                        "Catalog chain exhausted, using fallback provider",
                        json!({ "index": index, "provider": candidate.provider, "uri": candidate.source_uri }),
                    );
                    if !self.inner.settings.verify_fallback {
                        return;
                    }

                    let loaded = tokio::select! {
                        () = tokens.automation.cancelled() => return,
                        loaded = self.inner.probe.probe(&candidate) => loaded,
                    };
                    let verified = self.inner.state.lock().fsm.record_fallback_probe(generation, loaded);
                    match verified {
                        Step::Fallback(_) | Step::Discarded => return,
                        other => step = other,
                    }
                }
                Step::Unavailable => {
                    self.publish();
                    self.inner.events.log(
                        EventLevel::Error,
                        "Sources unavailable",
                        json!({ "generation": generation, "episode": self.snapshot().episode }),
                    );
                    return;
                }
                Step::Discarded => return,
            }
        }
    }

    /// Resolve catalog candidates. Every failure is absorbed into an empty
    /// list so the chain falls through to direct embeds.
    async fn resolve_catalog(&self, request: &PlaybackRequest) -> Vec<PlaybackCandidate> {
        let Some(catalog) = &self.inner.catalog else {
            return Vec::new();
        };

        let (mal_id, title) = self.enrich(request).await;
        let result = catalog
            .resolve(request.external_id, request.episode, title.as_deref(), mal_id)
            .await;

        match result {
            Ok(Some(entry)) => self.catalog_candidates(&entry),
            Ok(None) => {
                self.inner.events.info(
                    "No catalog match",
                    json!({ "externalId": request.external_id, "episode": request.episode }),
                );
                Vec::new()
            }
            Err(e) => {
                self.inner.events.warn(
                    "Catalog resolution failed, continuing without catalog candidates",
                    json!({ "externalId": request.external_id, "kind": e.kind(), "error": e.to_string() }),
                );
                Vec::new()
            }
        }
    }

    fn catalog_candidates(&self, entry: &ResolvedCatalogEntry) -> Vec<PlaybackCandidate> {
        let candidates =
            generate_catalog_candidates(entry, self.inner.settings.preferred_language, &self.inner.embeds);
        self.inner.events.info(
            "Catalog resolved",
            json!({
                "internalId": entry.internal_id,
                "episodeId": entry.episode_id,
                "servers": entry.servers.len(),
                "candidates": candidates.len(),
            }),
        );
        candidates
    }

    /// Fill a missing MAL id or title from the metadata API; failures keep
    /// whatever the request had.
    async fn enrich(&self, request: &PlaybackRequest) -> (Option<u64>, Option<String>) {
        let title = Some(request.title.trim().to_string()).filter(|t| !t.is_empty());
        let Some(metadata) = self.inner.metadata.as_ref().filter(|_| self.inner.settings.use_metadata_fallback)
        else {
            return (request.mal_id, title);
        };
        if request.mal_id.is_some() && title.is_some() {
            return (request.mal_id, title);
        }

        match metadata.media_identity(request.external_id).await {
            Ok(media) => {
                let mal_id = request.mal_id.or(media.id_mal);
                let title = title.or_else(|| media.display_title().map(str::to_string));
                self.inner.events.log(
                    EventLevel::Debug,
                    "Filled identifiers from metadata",
                    json!({ "malId": mal_id, "title": title }),
                );
                (mal_id, title)
            }
            Err(e) => {
                self.inner.events.log(
                    EventLevel::Debug,
                    "Metadata lookup failed",
                    json!({ "externalId": request.external_id, "error": e.to_string() }),
                );
                (request.mal_id, title)
            }
        }
    }

    /// Warm the remaining candidates of the locked tier in the background.
    fn spawn_preloader(&self, generation: u64, locked: usize, token: CancellationToken) {
        let targets: Vec<(usize, PlaybackCandidate)> = {
            let state = self.inner.state.lock();
            let candidates = state.fsm.candidates();
            let Some(tier) = candidates.get(locked).map(|c| c.language) else {
                return;
            };
            candidates
                .iter()
                .enumerate()
                .skip(locked + 1)
                .filter(|(_, c)| c.in_catalog_chain() && c.language == tier)
                .map(|(i, c)| (i, c.clone()))
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        let session = self.clone();
        let handle = tokio::spawn(async move {
            let inner = &session.inner;
            let is_interrupted = || {
                if token.is_cancelled() {
                    return true;
                }
                let state = inner.state.lock();
                state.fsm.generation() != generation || state.fsm.manual_override() || !state.fsm.is_locked()
            };

            let report = preload(
                &inner.probe,
                &targets,
                is_interrupted,
                inner.settings.preload_timeout(),
                inner.settings.client_profile,
            )
            .await;

            let recorded = inner.state.lock().fsm.record_preloaded(generation, &report.warmed);
            if recorded && !report.warmed.is_empty() {
                session.publish();
            }
        });

        if let Some(previous) = self.inner.preload_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// User picked `index`. Stops automatic advancement and background
    /// preloading for the rest of this episode.
    pub fn select_candidate(&self, index: usize) -> Result<PlaybackSnapshot> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            state.fsm.select(index)?;
            state.tokens.automation.cancel();
            state.fsm.snapshot()
        };
        self.inner.snapshots.send_replace(snapshot.clone());
        self.inner.events.info(
            "Manual selection",
            json!({ "index": index, "title": snapshot.candidates[index].title }),
        );
        Ok(snapshot)
    }

    /// Reset to `idle` for another episode with a fresh static list. Call
    /// [`run`](Self::run) or [`start`](Self::start) to drive it.
    pub fn change_episode(&self, episode: u32) -> Result<PlaybackSnapshot> {
        if episode == 0 {
            return Err(Error::InvalidInput("episode numbers start at 1".to_string()));
        }

        let snapshot = {
            let mut state = self.inner.state.lock();
            state.tokens.generation.cancel();
            state.tokens = Tokens::new();
            state.request.episode = episode;

            let request = &state.request;
            let candidates = generate_static_candidates(
                request.ids(),
                episode,
                &request.title,
                None,
                self.inner.settings.preferred_language,
                &self.inner.embeds,
            );
            state.request.start_offset = None;
            state.fsm.reset(episode, candidates);
            state.fsm.snapshot()
        };

        self.inner.snapshots.send_replace(snapshot.clone());
        self.inner.events.info(
            "Episode changed",
            json!({ "episode": episode, "generation": snapshot.generation }),
        );
        Ok(snapshot)
    }

    /// Re-run the chain for the current episode, typically after the
    /// "sources unavailable" state.
    pub fn retry(&self) -> Result<PlaybackSnapshot> {
        let episode = self.inner.state.lock().fsm.episode();
        self.change_episode(episode)
    }

    /// The terminal error for the current generation, if nothing can play.
    #[must_use]
    pub fn failure(&self) -> Option<Error> {
        let state = self.inner.state.lock();
        (state.fsm.phase() == Phase::Unavailable).then(|| {
            Error::ChainExhausted(format!(
                "no source could be loaded for episode {}",
                state.fsm.episode()
            ))
        })
    }

    /// Wait for the current background preload, if any, to finish.
    pub async fn wait_for_preload(&self) {
        let handle = self.inner.preload_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Preload task failed: {e}");
                }
            }
        }
    }

    /// Cancel everything this session is doing.
    pub fn close(&self) {
        self.inner.state.lock().tokens.generation.cancel();
    }

    #[must_use]
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.state.lock().fsm.snapshot()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.inner.snapshots.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    #[must_use]
    pub fn request(&self) -> PlaybackRequest {
        self.inner.state.lock().request.clone()
    }

    fn candidate(&self, index: usize) -> Option<PlaybackCandidate> {
        self.inner.state.lock().fsm.candidates().get(index).cloned()
    }

    fn publish(&self) {
        let snapshot = self.inner.state.lock().fsm.snapshot();
        self.inner.snapshots.send_replace(snapshot);
    }

    /// The priority chain is logged once per title and episode per session.
    /// `chain` is captured under the same lock as the catalog merge, so a
    /// concurrent episode change cannot swap in another episode's list.
    fn log_chain_once(&self, request: &PlaybackRequest, chain: &[String]) {
        self.inner.events.log_once(
            &format!("chain:{}:{}", request.external_id, request.episode),
            EventLevel::Info,
            "Priority chain",
            json!({ "episode": request.episode, "candidates": chain }),
        );
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("events", &self.inner.events)
            .field("probe", &self.inner.probe)
            .finish_non_exhaustive()
    }
}
