//! Fallback state machine
//!
//! `FallbackState` is the single mutable record of one playback view. It is
//! pure: the orchestrator feeds it events (catalog resolved, probe finished,
//! user selection, episode change) and acts on the returned [`Step`]. Every
//! automatic event carries the generation it was started under; results from
//! an older generation are discarded.

use serde::Serialize;

use super::candidate::{PlaybackCandidate, ProviderKind};
use crate::error::{Error, Result};

/// Where the automatic phase currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "index")]
pub enum Phase {
    Idle,
    Resolving,
    Probing(usize),
    Locked,
    Exhausted,
    /// The user took control; absorbing until the episode changes.
    Manual,
    /// Even the fallback failed to load.
    Unavailable,
}

impl Phase {
    /// No further automatic transitions will happen in this generation.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Locked | Self::Exhausted | Self::Manual | Self::Unavailable)
    }
}

/// What the orchestrator should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Probe `candidates[index]`.
    Probe(usize),
    /// `candidates[index]` is confirmed playing.
    Locked(usize),
    /// Catalog chain exhausted; `candidates[index]` is the fallback.
    Fallback(usize),
    /// Nothing can play.
    Unavailable,
    /// The event was stale or automation is off; do nothing.
    Discarded,
}

/// Reactive view published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub episode: u32,
    pub generation: u64,
    pub candidates: Vec<PlaybackCandidate>,
    pub current_index: usize,
    pub locked: bool,
    pub exhausted: bool,
    pub manual_override: bool,
    pub is_loading_catalog: bool,
    pub phase: Phase,
    /// URI the player should show; `None` while nothing is selectable.
    pub active_uri: Option<String>,
    /// Candidates warmed by the background preloader.
    pub preloaded: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct FallbackState {
    episode: u32,
    generation: u64,
    candidates: Vec<PlaybackCandidate>,
    current_index: usize,
    locked: bool,
    exhausted: bool,
    manual_override: bool,
    is_loading_catalog: bool,
    catalog_merged: bool,
    phase: Phase,
    fallback_provider: ProviderKind,
    preloaded: Vec<usize>,
}

impl FallbackState {
    #[must_use]
    pub fn new(episode: u32, candidates: Vec<PlaybackCandidate>, fallback_provider: ProviderKind) -> Self {
        Self {
            episode,
            generation: 0,
            candidates,
            current_index: 0,
            locked: false,
            exhausted: false,
            manual_override: false,
            is_loading_catalog: false,
            catalog_merged: false,
            phase: Phase::Idle,
            fallback_provider,
            preloaded: Vec::new(),
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn episode(&self) -> u32 {
        self.episode
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[must_use]
    pub const fn manual_override(&self) -> bool {
        self.manual_override
    }

    #[must_use]
    pub fn candidates(&self) -> &[PlaybackCandidate] {
        &self.candidates
    }

    /// Automatic transitions are allowed.
    fn automatic(&self) -> bool {
        !self.manual_override && !self.locked && !self.exhausted && self.phase != Phase::Unavailable
    }

    /// Catalog resolution started.
    pub fn begin_resolution(&mut self) {
        self.is_loading_catalog = true;
        if self.phase == Phase::Idle {
            self.phase = Phase::Resolving;
        }
    }

    /// Replace the placeholder with the resolved catalog candidates (possibly
    /// none). Happens at most once per generation; returns whether it did.
    pub fn extend_with_catalog(&mut self, generation: u64, catalog: Vec<PlaybackCandidate>) -> bool {
        if generation != self.generation || self.catalog_merged {
            return false;
        }
        self.catalog_merged = true;
        self.is_loading_catalog = false;

        let added = catalog.len();
        match self.candidates.iter().position(PlaybackCandidate::is_placeholder) {
            Some(at) => {
                self.candidates.splice(at..=at, catalog);
                // Keep a manual selection pointing at the same candidate
                if self.manual_override && self.current_index > at {
                    self.current_index = self.current_index + added - 1;
                }
            }
            None => {
                self.candidates.splice(0..0, catalog);
                if self.manual_override {
                    self.current_index += added;
                }
            }
        }
        true
    }

    /// Indices the automatic chain walks, in order.
    #[must_use]
    pub fn chain(&self) -> Vec<usize> {
        self.candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.in_catalog_chain())
            .map(|(i, _)| i)
            .collect()
    }

    /// `idle → probing(first)` once catalog resolution is done or skipped.
    pub fn begin(&mut self, generation: u64) -> Step {
        if generation != self.generation || !self.automatic() {
            return Step::Discarded;
        }
        if !matches!(self.phase, Phase::Idle | Phase::Resolving) {
            return Step::Discarded;
        }
        self.is_loading_catalog = false;
        match self.chain().first() {
            Some(&first) => {
                self.current_index = first;
                self.phase = Phase::Probing(first);
                Step::Probe(first)
            }
            None => self.exhaust(),
        }
    }

    /// Feed the result of probing `candidates[index]`.
    pub fn record_probe(&mut self, generation: u64, index: usize, loaded: bool) -> Step {
        if generation != self.generation || !self.automatic() || self.phase != Phase::Probing(index) {
            return Step::Discarded;
        }

        if loaded {
            self.current_index = index;
            self.locked = true;
            self.phase = Phase::Locked;
            return Step::Locked(index);
        }

        match self.chain().into_iter().find(|&i| i > index) {
            Some(next) => {
                self.current_index = next;
                self.phase = Phase::Probing(next);
                Step::Probe(next)
            }
            None => self.exhaust(),
        }
    }

    /// Select the always-available fallback: the first candidate of the
    /// configured provider, else the first non-catalog candidate.
    fn exhaust(&mut self) -> Step {
        self.exhausted = true;
        let fallback = self
            .candidates
            .iter()
            .position(|c| c.provider == self.fallback_provider && c.is_loadable())
            .or_else(|| {
                self.candidates
                    .iter()
                    .position(|c| !c.provider.is_catalog() && c.is_loadable())
            });
        match fallback {
            Some(index) => {
                self.current_index = index;
                self.phase = Phase::Exhausted;
                Step::Fallback(index)
            }
            None => {
                self.phase = Phase::Unavailable;
                Step::Unavailable
            }
        }
    }

    /// Feed the result of verifying the fallback candidate.
    pub fn record_fallback_probe(&mut self, generation: u64, loaded: bool) -> Step {
        if generation != self.generation || self.manual_override || self.phase != Phase::Exhausted {
            return Step::Discarded;
        }
        if loaded {
            Step::Fallback(self.current_index)
        } else {
            self.phase = Phase::Unavailable;
            Step::Unavailable
        }
    }

    /// User picked a candidate. Sticky for the rest of this generation.
    pub fn select(&mut self, index: usize) -> Result<()> {
        let len = self.candidates.len();
        match self.candidates.get(index) {
            Some(candidate) if !candidate.is_placeholder() => {
                self.manual_override = true;
                self.current_index = index;
                self.phase = Phase::Manual;
                Ok(())
            }
            _ => Err(Error::InvalidCandidate { index, len }),
        }
    }

    /// Record background warm-up results. Never touches selection state.
    pub fn record_preloaded(&mut self, generation: u64, indices: &[usize]) -> bool {
        if generation != self.generation {
            return false;
        }
        for &i in indices {
            if i < self.candidates.len() && !self.preloaded.contains(&i) {
                self.preloaded.push(i);
            }
        }
        true
    }

    /// Back to `idle` with a fresh static list; clears every flag.
    pub fn reset(&mut self, episode: u32, candidates: Vec<PlaybackCandidate>) -> u64 {
        self.generation += 1;
        self.episode = episode;
        self.candidates = candidates;
        self.current_index = 0;
        self.locked = false;
        self.exhausted = false;
        self.manual_override = false;
        self.is_loading_catalog = false;
        self.catalog_merged = false;
        self.phase = Phase::Idle;
        self.preloaded.clear();
        self.generation
    }

    #[must_use]
    pub fn snapshot(&self) -> PlaybackSnapshot {
        let active_uri = match self.phase {
            Phase::Idle | Phase::Resolving | Phase::Unavailable => None,
            _ => self
                .candidates
                .get(self.current_index)
                .filter(|c| !c.is_placeholder())
                .map(|c| c.source_uri.clone()),
        };
        PlaybackSnapshot {
            episode: self.episode,
            generation: self.generation,
            candidates: self.candidates.clone(),
            current_index: self.current_index,
            locked: self.locked,
            exhausted: self.exhausted,
            manual_override: self.manual_override,
            is_loading_catalog: self.is_loading_catalog,
            phase: self.phase,
            active_uri,
            preloaded: self.preloaded.clone(),
        }
    }
}
