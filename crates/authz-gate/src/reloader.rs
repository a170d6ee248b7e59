use std::sync::Arc;
use std::time::Duration;

use authz_policy::EngineFactory;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::gate::Shared;

/// Intervals too long to add to an [`Instant`] are clamped to this.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// What a single reload attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new policy was built and is now active.
    Loaded { policy_name: String, generation: u64 },
    /// The source was byte-for-byte identical to the active policy.
    Unchanged,
    /// The attempt failed; the previous policy remains active.
    Failed { reason: String },
}

/// The latest reload result, as seen by [`Gate::subscribe`](crate::Gate::subscribe).
///
/// `attempt` 0 is the load performed when the gate was constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    pub attempt: u64,
    /// Generation of the policy active once the attempt finished.
    pub generation: u64,
    pub outcome: ReloadOutcome,
}

/// Background refresh loop.
///
/// Ticks every `refresh_interval` until `cancel` turns `true` or its sender
/// is dropped. Each tick runs one reload to completion before the next
/// select, so reloads never overlap and cancellation is only observed
/// between them.
pub(crate) async fn run<F: EngineFactory>(
    shared: Arc<Shared<F>>,
    refresh_interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    // The initial load already happened in the constructor.
    let start = Instant::now();
    let first_tick = start
        .checked_add(refresh_interval)
        .unwrap_or_else(|| start + FAR_FUTURE);
    let period = refresh_interval.min(FAR_FUTURE);
    let mut ticker = time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempt = 0u64;

    debug!(path = %shared.source().path().display(), ?refresh_interval, "policy reloader started");

    loop {
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                attempt += 1;
                let outcome = shared.reload().await;
                shared.report(attempt, outcome);
            }
        }
    }

    debug!(path = %shared.source().path().display(), attempts = attempt, "policy reloader stopped");
}
