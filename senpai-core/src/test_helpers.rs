//! Test helpers and fixtures for senpai-core tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use senpai_providers::catalog::{Language, Quality};

use crate::error::ProbeError;
use crate::playback::{PlaybackCandidate, ProviderKind, SourceLoader};

/// A direct-embed candidate pointing at `uri`.
pub fn candidate_at(uri: &str) -> PlaybackCandidate {
    PlaybackCandidate {
        title: format!("Test {uri}"),
        source_uri: uri.to_string(),
        provider: ProviderKind::Vidsrc,
        language: Language::Sub,
        quality: Quality::Unknown,
        server_label: "vidsrc".to_string(),
        recommended: false,
    }
}

/// A catalog-chain candidate.
pub fn catalog_candidate(label: &str, language: Language, quality: Quality) -> PlaybackCandidate {
    PlaybackCandidate {
        title: format!("SenpaiPlay {} {label} {quality}", language.label()),
        source_uri: format!("https://{}.example/stream/s-2/1/{language}", label.to_lowercase()),
        provider: ProviderKind::Catalog,
        language,
        quality,
        server_label: label.to_string(),
        recommended: false,
    }
}

/// Loader that never signals.
pub struct NeverLoader;

#[async_trait]
impl SourceLoader for NeverLoader {
    async fn load(&self, _uri: &str) -> Result<(), ProbeError> {
        std::future::pending().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Load,
    Fail,
    Hang,
}

/// Loader with per-URI scripted outcomes (first substring match wins).
pub struct ScriptedLoader {
    rules: Vec<(String, Outcome)>,
    default: Outcome,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default: Outcome::Load,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Outcome::Fail));
        self
    }

    pub fn load(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Outcome::Load));
        self
    }

    pub fn hang(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Outcome::Hang));
        self
    }

    pub fn otherwise(mut self, outcome: Outcome) -> Self {
        self.default = outcome;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// URIs in the order they were loaded.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SourceLoader for ScriptedLoader {
    async fn load(&self, uri: &str) -> Result<(), ProbeError> {
        self.calls.lock().push(uri.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self
            .rules
            .iter()
            .find(|(pattern, _)| uri.contains(pattern.as_str()))
            .map_or(self.default, |(_, outcome)| *outcome);
        match outcome {
            Outcome::Load => Ok(()),
            Outcome::Fail => Err(ProbeError::Load(format!("scripted failure for {uri}"))),
            Outcome::Hang => std::future::pending().await,
        }
    }
}
