use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use authz_policy::{
    translate, ChainEngineFactory, Decision, DecisionEngine, EngineFactory, EvaluationError,
};
use call_context::CallContext;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConfigurationError, ConstructionError, LoadError};
use crate::reloader::{self, ReloadOutcome, ReloadReport};
use crate::source::PolicyFile;

/// A successfully built policy together with the bytes it was built from.
///
/// Published as a whole, so a reader always sees an engine and the document
/// that produced it.
#[derive(Debug)]
pub struct ActivePolicy<E> {
    engine: E,
    contents: Vec<u8>,
    policy_name: String,
    generation: u64,
}

impl<E> ActivePolicy<E> {
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// 0 for the policy loaded at construction, +1 for every rebuild since.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// State shared between the gate and its reloader task.
pub(crate) struct Shared<F: EngineFactory> {
    source: PolicyFile,
    factory: F,
    active: RwLock<Arc<ActivePolicy<F::Engine>>>,
    reports: watch::Sender<ReloadReport>,
}

impl<F: EngineFactory> Shared<F> {
    pub(crate) fn source(&self) -> &PolicyFile {
        &self.source
    }

    /// The active policy. The lock is held only for the `Arc` clone.
    pub(crate) fn snapshot(&self) -> Arc<ActivePolicy<F::Engine>> {
        let guard = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn publish(&self, next: ActivePolicy<F::Engine>) {
        let next = Arc::new(next);
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Re-read the source and swap in a new engine if the document changed.
    /// Any failure leaves the active policy untouched.
    pub(crate) async fn reload(&self) -> ReloadOutcome {
        let path = self.source.path().display();
        let current = self.snapshot();

        let contents = match self.source.read().await {
            Ok(contents) => contents,
            Err(err) => return reload_failed(&path, err),
        };
        if contents == current.contents {
            debug!(path = %path, generation = current.generation, "authorization policy unchanged");
            return ReloadOutcome::Unchanged;
        }

        match build_policy(&self.factory, contents, current.generation + 1) {
            Ok(next) => {
                info!(
                    path = %path,
                    policy = %next.policy_name,
                    generation = next.generation,
                    "authorization policy reloaded"
                );
                let outcome = ReloadOutcome::Loaded {
                    policy_name: next.policy_name.clone(),
                    generation: next.generation,
                };
                self.publish(next);
                outcome
            }
            Err(err) => reload_failed(&path, err),
        }
    }

    pub(crate) fn report(&self, attempt: u64, outcome: ReloadOutcome) {
        let generation = self.snapshot().generation;
        self.reports.send_replace(ReloadReport {
            attempt,
            generation,
            outcome,
        });
    }
}

fn reload_failed(path: &impl std::fmt::Display, err: LoadError) -> ReloadOutcome {
    warn!(path = %path, error = %err, "authorization policy reload failed; keeping previous policy");
    ReloadOutcome::Failed {
        reason: err.to_string(),
    }
}

/// Translate `contents` and build an engine from it.
fn build_policy<F: EngineFactory>(
    factory: &F,
    contents: Vec<u8>,
    generation: u64,
) -> Result<ActivePolicy<F::Engine>, LoadError> {
    let (rule_sets, policy_name) = translate(&contents)?;
    let engine = factory.build(rule_sets, &policy_name)?;
    Ok(ActivePolicy {
        engine,
        contents,
        policy_name,
        generation,
    })
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Authorizes calls against a policy file that is re-read in the background.
///
/// The gate always holds a working engine: construction fails unless the
/// first load succeeds, and later loads only replace the engine when they
/// succeed *and* the file content changed. [`authorize`](Self::authorize)
/// never waits for a reload.
///
/// Dropping the gate stops the reloader.
pub struct Gate<F: EngineFactory = ChainEngineFactory> {
    shared: Arc<Shared<F>>,
    refresh_interval: Duration,
    cancel: watch::Sender<bool>,
    reloader: Mutex<Option<JoinHandle<()>>>,
}

impl<F: EngineFactory> std::fmt::Debug for Gate<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.shared.snapshot();
        f.debug_struct("Gate")
            .field("source", &self.shared.source.path())
            .field("refresh_interval", &self.refresh_interval)
            .field("policy_name", &active.policy_name)
            .field("generation", &active.generation)
            .finish()
    }
}

impl Gate<ChainEngineFactory> {
    /// Load the policy at `path` and start refreshing it every
    /// `refresh_interval`, using the built-in chain engine.
    pub async fn start(
        path: impl Into<PathBuf>,
        refresh_interval: Duration,
    ) -> Result<Self, ConstructionError> {
        Self::with_factory(path, refresh_interval, ChainEngineFactory).await
    }
}

impl<F: EngineFactory> Gate<F> {
    /// Like [`Gate::start`], with a custom engine factory.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn with_factory(
        path: impl Into<PathBuf>,
        refresh_interval: Duration,
        factory: F,
    ) -> Result<Self, ConstructionError> {
        let source = PolicyFile::new(path)?;
        if refresh_interval.is_zero() {
            return Err(ConfigurationError::NonPositiveInterval(refresh_interval).into());
        }

        let contents = source.read().await?;
        let initial = build_policy(&factory, contents, 0)?;

        info!(
            path = %source.path().display(),
            policy = %initial.policy_name,
            ?refresh_interval,
            "authorization policy loaded"
        );

        let (reports, _) = watch::channel(ReloadReport {
            attempt: 0,
            generation: 0,
            outcome: ReloadOutcome::Loaded {
                policy_name: initial.policy_name.clone(),
                generation: 0,
            },
        });
        let shared = Arc::new(Shared {
            source,
            factory,
            active: RwLock::new(Arc::new(initial)),
            reports,
        });

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(reloader::run(Arc::clone(&shared), refresh_interval, cancel_rx));

        Ok(Self {
            shared,
            refresh_interval,
            cancel,
            reloader: Mutex::new(Some(handle)),
        })
    }

    /// Authorize one call against the currently active policy.
    pub fn authorize(&self, ctx: &CallContext) -> Result<Decision, EvaluationError> {
        let active = self.shared.snapshot();
        active.engine.evaluate(ctx)
    }

    /// The currently active policy.
    pub fn active_policy(&self) -> Arc<ActivePolicy<F::Engine>> {
        self.shared.snapshot()
    }

    /// Watch reload results as they happen.
    pub fn subscribe(&self) -> watch::Receiver<ReloadReport> {
        self.shared.reports.subscribe()
    }

    pub fn source(&self) -> &Path {
        self.shared.source.path()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Signal the reloader to stop after any reload in progress. Safe to
    /// call more than once. The gate keeps authorizing with the last
    /// active policy.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }

    /// [`stop`](Self::stop) and wait for the reloader task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(handle) = self.reloader.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(%err, "policy reloader task failed");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use authz_policy::{ChainEngine, EngineBuildError, RuleSet, Verdict};
    use call_context::{AuthInfo, Peer, PeerAddr};

    const ALLOW_ALL: &str = r#"{"name": "p1", "allow_rules": [{"name": "allow_all"}]}"#;
    const DENY_ALL: &str = r#"{
        "name": "p2",
        "deny_rules": [{"name": "deny_all"}],
        "allow_rules": [{"name": "allow_all"}]
    }"#;
    const INTERVAL: Duration = Duration::from_millis(20);

    fn call() -> CallContext {
        CallContext::new("/pkg.Svc/Get").with_peer(Peer {
            addr: Some(PeerAddr::new("tcp", "192.0.2.2:5000")),
            local_addr: Some(PeerAddr::new("tcp", "192.0.2.1:9339")),
            auth: Some(AuthInfo::Insecure),
        })
    }

    /// Write through a rename so the reloader never reads a half-written file.
    fn write_policy(path: &Path, contents: &str) {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, contents).unwrap();
        std::fs::rename(&tmp, path).unwrap();
    }

    fn policy_file(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("policy.json");
        write_policy(&path, contents);
        path
    }

    /// Wait until a report satisfies `pred`. Reports are coalesced by the
    /// watch channel, so predicates should look at `generation` rather than
    /// expect to see every `Loaded`.
    async fn wait_for(
        rx: &mut watch::Receiver<ReloadReport>,
        pred: impl Fn(&ReloadReport) -> bool,
    ) -> ReloadReport {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.expect("reloader should be running");
                let report = rx.borrow_and_update().clone();
                if pred(&report) {
                    return report;
                }
            }
        })
        .await
        .expect("expected reload report in time")
    }

    fn failed(report: &ReloadReport) -> bool {
        matches!(report.outcome, ReloadOutcome::Failed { .. })
    }

    /// Counts how many engines were built.
    #[derive(Default)]
    struct CountingFactory {
        builds: Arc<AtomicUsize>,
    }

    impl EngineFactory for CountingFactory {
        type Engine = ChainEngine;

        fn build(
            &self,
            rule_sets: Vec<RuleSet>,
            policy_name: &str,
        ) -> Result<ChainEngine, EngineBuildError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            ChainEngineFactory.build(rule_sets, policy_name)
        }
    }

    // -- Construction --

    #[tokio::test]
    async fn valid_policy_creates_gate() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::start(policy_file(&dir, ALLOW_ALL), INTERVAL).await.unwrap();
        let d = gate.authorize(&call()).unwrap();
        assert_eq!(d.verdict, Verdict::Permit);
        assert_eq!(gate.active_policy().policy_name(), "p1");
        assert_eq!(gate.active_policy().generation(), 0);
        assert_eq!(gate.refresh_interval(), INTERVAL);
        gate.shutdown().await;
    }

    #[tokio::test]
    async fn zero_interval_fails_to_create_gate() {
        let dir = tempfile::tempdir().unwrap();
        let err = Gate::start(policy_file(&dir, ALLOW_ALL), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::Configuration(ConfigurationError::NonPositiveInterval(_))
        ));
        assert!(
            err.to_string().starts_with("requires refresh interval("),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn empty_path_fails_before_reading() {
        let err = Gate::start("", INTERVAL).await.unwrap_err();
        assert!(matches!(
            err,
            ConstructionError::Configuration(ConfigurationError::EmptySource)
        ));
        assert_eq!(err.to_string(), "authorization policy file path is empty");
    }

    #[tokio::test]
    async fn missing_file_fails_to_create_gate() {
        let dir = tempfile::tempdir().unwrap();
        let err = Gate::start(dir.path().join("absent.json"), INTERVAL)
            .await
            .unwrap_err();
        assert!(matches!(err, ConstructionError::Load(LoadError::SourceRead { .. })));
    }

    #[tokio::test]
    async fn policy_without_name_fails_to_create_gate() {
        let dir = tempfile::tempdir().unwrap();
        let err = Gate::start(policy_file(&dir, "{}"), INTERVAL).await.unwrap_err();
        assert!(matches!(err, ConstructionError::Load(LoadError::Translation(_))));
        assert_eq!(err.to_string(), "\"name\" is not present");
    }

    #[tokio::test]
    async fn engine_build_failure_fails_to_create_gate() {
        let dir = tempfile::tempdir().unwrap();
        let dup = r#"{"name": "p", "allow_rules": [{"name": "a"}, {"name": "a"}]}"#;
        let err = Gate::start(policy_file(&dir, dup), INTERVAL).await.unwrap_err();
        assert!(matches!(err, ConstructionError::Load(LoadError::EngineBuild(_))));
    }

    // -- Reloading --

    #[tokio::test]
    async fn unchanged_source_is_not_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let factory = CountingFactory::default();
        let builds = Arc::clone(&factory.builds);
        let gate = Gate::with_factory(policy_file(&dir, ALLOW_ALL), INTERVAL, factory)
            .await
            .unwrap();
        let before = gate.active_policy();
        let mut rx = gate.subscribe();

        wait_for(&mut rx, |r| r.outcome == ReloadOutcome::Unchanged).await;
        wait_for(&mut rx, |r| r.outcome == ReloadOutcome::Unchanged).await;

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&before, &gate.active_policy()));
        gate.shutdown().await;
    }

    #[tokio::test]
    async fn corrupt_source_keeps_previous_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = policy_file(&dir, ALLOW_ALL);
        let gate = Gate::start(&path, INTERVAL).await.unwrap();
        let before = gate.authorize(&call()).unwrap();
        let mut rx = gate.subscribe();

        write_policy(&path, "{ this is not json");
        let report = wait_for(&mut rx, failed).await;
        assert!(report.attempt > 0);

        assert_eq!(gate.authorize(&call()).unwrap(), before);
        assert_eq!(gate.active_policy().contents(), ALLOW_ALL.as_bytes());
        assert_eq!(gate.active_policy().generation(), 0);
        gate.shutdown().await;
    }

    #[tokio::test]
    async fn unreadable_source_keeps_previous_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = policy_file(&dir, ALLOW_ALL);
        let gate = Gate::start(&path, INTERVAL).await.unwrap();
        let mut rx = gate.subscribe();

        std::fs::remove_file(&path).unwrap();
        let report = wait_for(&mut rx, failed).await;
        match report.outcome {
            ReloadOutcome::Failed { reason } => {
                assert!(reason.contains("read failed"), "unexpected reason: {reason}")
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(gate.authorize(&call()).unwrap().is_permit());

        // Recovers once the file comes back.
        write_policy(&path, DENY_ALL);
        wait_for(&mut rx, |r| r.generation == 1).await;
        assert!(!gate.authorize(&call()).unwrap().is_permit());
        gate.shutdown().await;
    }

    #[tokio::test]
    async fn missing_name_reported_the_same_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = policy_file(&dir, ALLOW_ALL);
        let gate = Gate::start(&path, INTERVAL).await.unwrap();
        let mut rx = gate.subscribe();

        write_policy(&path, r#"{"allow_rules": [{"name": "a"}]}"#);
        let report = wait_for(&mut rx, failed).await;
        assert_eq!(
            report.outcome,
            ReloadOutcome::Failed {
                reason: "\"name\" is not present".to_string()
            }
        );
        gate.shutdown().await;
    }

    #[tokio::test]
    async fn new_policy_replaces_old() {
        let dir = tempfile::tempdir().unwrap();
        let path = policy_file(&dir, ALLOW_ALL);
        let gate = Gate::start(&path, INTERVAL).await.unwrap();
        assert!(gate.authorize(&call()).unwrap().is_permit());
        let mut rx = gate.subscribe();

        write_policy(&path, DENY_ALL);
        let report = wait_for(&mut rx, |r| r.generation == 1).await;
        assert!(report.attempt > 0);
        assert_eq!(gate.active_policy().policy_name(), "p2");

        let d = gate.authorize(&call()).unwrap();
        assert_eq!(d.verdict, Verdict::Deny);
        assert_eq!(d.policy_name, "p2");
        gate.shutdown().await;
    }

    #[tokio::test]
    async fn evaluation_errors_reach_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::start(policy_file(&dir, ALLOW_ALL), INTERVAL).await.unwrap();
        let err = gate.authorize(&CallContext::new("/pkg.Svc/Get")).unwrap_err();
        assert_eq!(err, EvaluationError::MissingPeer);
        gate.shutdown().await;
    }

    // -- Lifecycle --

    #[tokio::test]
    async fn stopped_gate_keeps_last_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = policy_file(&dir, ALLOW_ALL);
        let gate = Gate::start(&path, INTERVAL).await.unwrap();
        gate.shutdown().await;
        gate.stop();

        write_policy(&path, DENY_ALL);
        tokio::time::sleep(INTERVAL * 5).await;

        assert!(gate.authorize(&call()).unwrap().is_permit());
        assert_eq!(gate.active_policy().generation(), 0);
    }

    #[tokio::test]
    async fn huge_interval_keeps_reloader_alive() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Gate::start(policy_file(&dir, ALLOW_ALL), Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let handle = gate.reloader.lock().await.take().unwrap();
        assert!(!handle.is_finished(), "reloader exited before stop");
        assert!(gate.authorize(&call()).unwrap().is_permit());

        gate.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reloader should observe stop")
            .expect("reloader should exit without panicking");
    }

    // -- Concurrency --

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_authorize_during_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = policy_file(&dir, ALLOW_ALL);
        let gate = Arc::new(Gate::start(&path, Duration::from_millis(5)).await.unwrap());
        let mut rx = gate.subscribe();

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    let ctx = call();
                    for _ in 0..2_000 {
                        let d = gate.authorize(&ctx).expect("swap must never surface an error");
                        match d.policy_name.as_str() {
                            "p1" => assert_eq!(d.verdict, Verdict::Permit),
                            "p2" => assert_eq!(d.verdict, Verdict::Deny),
                            other => panic!("unexpected policy {other}"),
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for (generation, contents) in [(1, DENY_ALL), (2, ALLOW_ALL), (3, DENY_ALL)] {
            write_policy(&path, contents);
            wait_for(&mut rx, |r| r.generation == generation).await;
        }

        for caller in callers {
            caller.await.unwrap();
        }
        assert_eq!(gate.active_policy().generation(), 3);
        gate.shutdown().await;
    }
}
