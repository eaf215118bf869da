use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use senpai_providers::catalog::{CatalogTtls, Language};
use senpai_providers::ApiClientConfig;

use crate::playback::ProviderKind;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub upstream: UpstreamConfig,
    pub playback: PlaybackConfig,
    pub embeds: EmbedsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub catalog_base_url: String,
    pub metadata_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub default_min_interval_ms: u64,
    /// Minimum interval per logical host (`catalog`, `anilist`)
    pub min_interval_ms: HashMap<String, u64>,
    pub cache_capacity: u64,
    pub search_ttl_secs: u64,
    pub episodes_ttl_secs: u64,
    pub servers_ttl_secs: u64,
    pub metadata_ttl_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let mut min_interval_ms = HashMap::new();
        min_interval_ms.insert("catalog".to_string(), 250);
        min_interval_ms.insert("anilist".to_string(), 700);
        Self {
            catalog_base_url: "http://127.0.0.1:4000".to_string(),
            metadata_url: senpai_providers::metadata::DEFAULT_METADATA_URL.to_string(),
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            default_min_interval_ms: 250,
            min_interval_ms,
            cache_capacity: 512,
            search_ttl_secs: 600,
            episodes_ttl_secs: 300,
            servers_ttl_secs: 300,
            metadata_ttl_secs: 900,
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            default_min_interval: Duration::from_millis(self.default_min_interval_ms),
            min_intervals: self
                .min_interval_ms
                .iter()
                .map(|(host, ms)| (host.clone(), Duration::from_millis(*ms)))
                .collect(),
            cache_capacity: self.cache_capacity,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    #[must_use]
    pub const fn catalog_ttls(&self) -> CatalogTtls {
        CatalogTtls {
            search: Duration::from_secs(self.search_ttl_secs),
            episodes: Duration::from_secs(self.episodes_ttl_secs),
            servers: Duration::from_secs(self.servers_ttl_secs),
        }
    }

    #[must_use]
    pub const fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_secs)
    }
}

/// Constrained clients preload at most one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientProfile {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub probe_timeout_ms: u64,
    /// Pause between consecutive automatic probes
    pub retry_delay_ms: u64,
    /// Hard deadline for one background preload run
    pub preload_timeout_ms: u64,
    pub client_profile: ClientProfile,
    pub preferred_language: Language,
    /// Provider selected when every catalog candidate failed
    pub fallback_provider: ProviderKind,
    pub verify_fallback: bool,
    pub use_metadata_fallback: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 15_000,
            retry_delay_ms: 1_500,
            preload_timeout_ms: 10_000,
            client_profile: ClientProfile::Desktop,
            preferred_language: Language::Sub,
            fallback_provider: ProviderKind::Vidsrc,
            verify_fallback: true,
            use_metadata_fallback: true,
        }
    }
}

impl PlaybackConfig {
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn preload_timeout(&self) -> Duration {
        Duration::from_millis(self.preload_timeout_ms)
    }
}

/// Base URLs of every embed host plus the catalog brand label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedsConfig {
    pub brand: String,
    pub vidsrc_base: String,
    pub megaplay_base: String,
    pub videasy_base: String,
    pub vidlink_base: String,
    pub twoanime_base: String,
    /// Host behind the catalog's `MegaPlay` server label
    pub megaplay_server_base: String,
    /// Host behind the catalog's `VidWish` server label
    pub vidwish_server_base: String,
}

impl Default for EmbedsConfig {
    fn default() -> Self {
        Self {
            brand: "SenpaiPlay".to_string(),
            vidsrc_base: "https://vidsrc.cc".to_string(),
            megaplay_base: "https://megaplay.buzz".to_string(),
            videasy_base: "https://player.videasy.net".to_string(),
            vidlink_base: "https://vidlink.pro".to_string(),
            twoanime_base: "https://2anime.xyz".to_string(),
            megaplay_server_base: "https://megaplay.buzz".to_string(),
            vidwish_server_base: "https://vidwish.live".to_string(),
        }
    }
}

impl EmbedsConfig {
    /// Point every host at one base URL (local mocks, staging proxies).
    #[must_use]
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            brand: Self::default().brand,
            vidsrc_base: base.clone(),
            megaplay_base: base.clone(),
            videasy_base: base.clone(),
            vidlink_base: base.clone(),
            twoanime_base: base.clone(),
            megaplay_server_base: base.clone(),
            vidwish_server_base: base,
        }
    }

    fn bases(&self) -> [(&'static str, &str); 7] {
        [
            ("embeds.vidsrc_base", &self.vidsrc_base),
            ("embeds.megaplay_base", &self.megaplay_base),
            ("embeds.videasy_base", &self.videasy_base),
            ("embeds.vidlink_base", &self.vidlink_base),
            ("embeds.twoanime_base", &self.twoanime_base),
            ("embeds.megaplay_server_base", &self.megaplay_server_base),
            ("embeds.vidwish_server_base", &self.vidwish_server_base),
        ]
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            } else {
                tracing::warn!("Config file {path} not found, using defaults");
            }
        }

        // Override with environment variables (SENPAI_PLAYBACK__PROBE_TIMEOUT_MS, etc.)
        builder = builder.add_source(
            Environment::with_prefix("SENPAI")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Human-readable problems that should stop startup; empty when valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            problems.push(format!("logging.level: unknown level '{}'", self.logging.level));
        }

        let urls = [
            ("upstream.catalog_base_url", self.upstream.catalog_base_url.as_str()),
            ("upstream.metadata_url", self.upstream.metadata_url.as_str()),
        ];
        for (key, value) in urls.into_iter().chain(self.embeds.bases()) {
            if value.trim().is_empty() {
                problems.push(format!("{key}: must not be empty"));
            } else if url::Url::parse(value.trim()).is_err() {
                problems.push(format!("{key}: invalid URL '{value}'"));
            }
        }

        if self.upstream.cache_capacity == 0 {
            problems.push("upstream.cache_capacity: must be greater than zero".to_string());
        }
        if self.playback.probe_timeout_ms == 0 {
            problems.push("playback.probe_timeout_ms: must be greater than zero".to_string());
        }
        if self.playback.preload_timeout_ms == 0 {
            problems.push("playback.preload_timeout_ms: must be greater than zero".to_string());
        }
        if self.playback.fallback_provider == ProviderKind::Catalog {
            problems.push(
                "playback.fallback_provider: must be a direct-embed provider, not the catalog".to_string(),
            );
        }
        if self.playback.preferred_language == Language::Both {
            problems.push("playback.preferred_language: must be 'sub' or 'dub'".to_string());
        }

        problems
    }

    /// Load, then fail on the first validation problem.
    pub fn load_validated(config_file: Option<&str>) -> crate::Result<Self> {
        let config = Self::load(config_file)?;
        let problems = config.validate();
        if problems.is_empty() {
            Ok(config)
        } else {
            Err(crate::Error::Config(problems.join("; ")))
        }
    }
}
