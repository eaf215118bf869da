//! Background preloader
//!
//! After a lock, warms the remaining same-tier candidates one at a time so a
//! manual switch is instant. Read-only with respect to selection state: it
//! only reports which candidates loaded.

use std::time::Duration;
use tokio::time::Instant;

use super::candidate::PlaybackCandidate;
use super::probe::Probe;
use crate::config::ClientProfile;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Indices that loaded successfully
    pub warmed: Vec<usize>,
    pub failed: Vec<usize>,
    pub interrupted: bool,
    pub timed_out: bool,
}

/// Probe `candidates` sequentially until done, interrupted, or `hard_timeout`
/// elapses. `is_interrupted` is checked before and after every probe.
pub async fn preload<F>(
    probe: &Probe,
    candidates: &[(usize, PlaybackCandidate)],
    is_interrupted: F,
    hard_timeout: Duration,
    profile: ClientProfile,
) -> PreloadReport
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + hard_timeout;
    let limit = match profile {
        ClientProfile::Mobile => 1,
        ClientProfile::Desktop => candidates.len(),
    };

    let mut report = PreloadReport::default();
    for (index, candidate) in candidates.iter().take(limit) {
        if is_interrupted() {
            report.interrupted = true;
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            report.timed_out = true;
            break;
        }

        let loaded = probe
            .probe_with_timeout(candidate, remaining.min(probe.default_timeout()))
            .await;

        if is_interrupted() {
            report.interrupted = true;
            break;
        }
        if loaded {
            report.warmed.push(*index);
        } else {
            report.failed.push(*index);
        }
    }

    tracing::debug!(
        warmed = report.warmed.len(),
        failed = report.failed.len(),
        interrupted = report.interrupted,
        timed_out = report.timed_out,
        "Background preload finished"
    );
    report
}
