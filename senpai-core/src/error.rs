use senpai_providers::UpstreamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Invalid candidate: index {index} (have {len} candidates)")]
    InvalidCandidate { index: usize, len: usize },

    /// Every candidate failed, including the always-available fallback.
    #[error("Sources unavailable: {0}")]
    ChainExhausted(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl Error {
    /// Whether this error should reach the user. Upstream and probe failures
    /// are absorbed by the fallback chain; only total exhaustion is shown.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(self, Self::ChainExhausted(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a failed load attempt. Routine, never surfaced to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Probe timed out")]
    Timeout,

    #[error("Load error: {0}")]
    Load(String),
}
