//! The admission decision engine.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::category::Category;
use super::clock::{Clock, SystemClock};
use super::decision::{Decision, DecisionReason, ThrottleStatus};
use super::entry::{EntrySnapshot, WindowEntry};
use super::key::ThrottleKey;
use super::reaper::{Reaper, ReaperHandle};
use super::registry::CategoryRegistry;
use super::sink::{DecisionEvent, DecisionSink, FailureEvent, TracingSink};
use super::stats::ThrottleStatistics;
use super::store::CounterStore;
use crate::config::EngineConfig;
use crate::error::{Result, ThrottleError};

enum Lifecycle {
    Idle,
    Running(ReaperHandle),
    Stopped,
}

/// The throttling engine.
///
/// Holds the counter store, the category registry and the reaper lifecycle.
/// All request-path operations are synchronous, in-memory and safe to call
/// from many threads at once; share the engine behind an `Arc`.
pub struct ThrottleEngine {
    registry: Arc<CategoryRegistry>,
    store: Arc<CounterStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn DecisionSink>,
    config: EngineConfig,
    lifecycle: Mutex<Lifecycle>,
    fail_open_total: AtomicU64,
}

impl ThrottleEngine {
    /// Create an engine.
    ///
    /// Fails if the registry lacks a policy for any category or the engine
    /// configuration is invalid, so unknown categories cannot surface at
    /// request time.
    pub fn new(registry: CategoryRegistry, config: EngineConfig) -> Result<Self> {
        registry.validate_categories(&Category::ALL)?;
        Self::new_unchecked(registry, config)
    }

    /// Create an engine without checking category coverage.
    ///
    /// Attempts in a category without a policy fail open.
    pub fn new_unchecked(registry: CategoryRegistry, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        info!(
            categories = registry.categories().count(),
            shards = config.shard_amount,
            "Throttle engine initialized"
        );

        Ok(Self {
            registry: Arc::new(registry),
            store: Arc::new(CounterStore::new(config.shard_amount)),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
            fail_open_total: AtomicU64::new(0),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the decision sink.
    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Check whether an attempt may proceed, and record it.
    ///
    /// The check and the increment happen in one critical section per key,
    /// so concurrent attempts can never be over-admitted.
    ///
    /// This never fails: an internal error allows the attempt (fail-open),
    /// is logged, and is reported to the sink's `on_failure`.
    pub fn check_and_record(&self, category: Category, identifier: &str) -> Decision {
        let decision = match self.try_check_and_record(category, identifier) {
            Ok(decision) => decision,
            Err(e) => self.fail_open(category, identifier, e),
        };

        self.sink
            .on_decision(&DecisionEvent::new(category, identifier, &decision));
        decision
    }

    fn try_check_and_record(&self, category: Category, identifier: &str) -> Result<Decision> {
        let policy = self.registry.get_policy(category)?;
        let now = self.clock.now();
        let key = ThrottleKey::new(category, identifier);

        trace!(key = %key, "Checking attempt");

        let decision = self.store.upsert(
            key,
            || {
                debug!(
                    category = %category,
                    identifier = %identifier,
                    max_attempts = policy.max_attempts,
                    "Tracking new identifier"
                );
                let entry = WindowEntry::new(identifier, now);
                let decision = policy.classify(entry.attempt_count);
                (entry, Ok(decision))
            },
            |entry| entry.record_attempt(policy, now),
        )?;

        if decision.reason == DecisionReason::LimitExceeded {
            debug!(
                category = %category,
                identifier = %identifier,
                block_secs = policy.block_duration.as_secs(),
                "Limit exceeded, identifier blocked"
            );
        }

        Ok(decision)
    }

    fn fail_open(&self, category: Category, identifier: &str, error: ThrottleError) -> Decision {
        self.fail_open_total.fetch_add(1, Ordering::Relaxed);
        warn!(
            category = %category,
            identifier = %identifier,
            error = %error,
            "Throttle check failed, allowing attempt"
        );
        self.sink.on_failure(&FailureEvent {
            category,
            identifier: identifier.to_string(),
            error: error.to_string(),
            timestamp: chrono::Utc::now(),
        });
        Decision::fail_open()
    }

    /// Report the outcome of an admitted attempt.
    ///
    /// A success gives back one attempt (never below one, never while a block
    /// is recorded). This is best-effort relief for legitimate users, not a
    /// security control: an attacker will simply not report outcomes.
    pub fn record_outcome(&self, category: Category, identifier: &str, succeeded: bool) {
        if !succeeded {
            return;
        }

        let key = ThrottleKey::new(category, identifier);
        if let Some(true) = self.store.modify(&key, |entry| entry.relieve()) {
            debug!(key = %key, "Attempt relieved after success");
        }
    }

    /// Clear the entry for one category. Returns whether one existed.
    pub fn reset(&self, category: Category, identifier: &str) -> bool {
        let removed = self.store.remove(&ThrottleKey::new(category, identifier));
        if removed {
            info!(category = %category, identifier = %identifier, "Throttle entry reset");
        }
        removed
    }

    /// Clear the entries for an identifier in every category.
    pub fn reset_identifier(&self, identifier: &str) -> usize {
        let removed = self.store.remove_identifier(identifier);
        if removed > 0 {
            info!(identifier = %identifier, removed = removed, "Throttle entries reset");
        }
        removed
    }

    /// Read an identifier's standing without counting an attempt.
    pub fn get_status(&self, category: Category, identifier: &str) -> Result<ThrottleStatus> {
        let policy = self.registry.get_policy(category)?;
        let now = self.clock.now();
        let entry = self.store.get(&ThrottleKey::new(category, identifier));

        let fresh = ThrottleStatus {
            category,
            attempts: 0,
            max_attempts: policy.max_attempts,
            remaining_attempts: policy.max_attempts,
            blocked: false,
            retry_after: None,
            resets_in: None,
        };

        let Some(entry) = entry else {
            return Ok(fresh);
        };

        if let Some(blocked_until) = entry.blocked_until {
            if now < blocked_until {
                return Ok(ThrottleStatus {
                    attempts: entry.attempt_count,
                    remaining_attempts: 0,
                    blocked: true,
                    retry_after: Some(blocked_until - now),
                    ..fresh
                });
            }
            return Ok(fresh);
        }

        let counting = ThrottleStatus {
            attempts: entry.attempt_count,
            remaining_attempts: policy.remaining(entry.attempt_count),
            ..fresh.clone()
        };
        // A window end past what `Instant` can hold never resets
        let Some(window_end) = entry.window_start.checked_add(policy.window) else {
            return Ok(counting);
        };
        match window_end.checked_duration_since(now) {
            Some(resets_in) if !resets_in.is_zero() => Ok(ThrottleStatus {
                resets_in: Some(resets_in),
                ..counting
            }),
            _ => Ok(fresh),
        }
    }

    /// Snapshot a single entry, if tracked.
    pub fn snapshot(&self, category: Category, identifier: &str) -> Option<EntrySnapshot> {
        let policy = self.registry.get_policy(category).ok()?;
        let now = self.clock.now();
        self.store
            .get(&ThrottleKey::new(category, identifier))
            .map(|entry| entry.snapshot(category, policy, now))
    }

    /// Identifiers currently blocked in a category, sorted.
    pub fn blocked_identifiers(&self, category: Category) -> Vec<String> {
        let now = self.clock.now();
        let mut blocked = Vec::new();
        self.store.for_each(|key, entry| {
            if key.category == category && entry.is_blocked(now) {
                blocked.push(key.identifier.clone());
            }
        });
        blocked.sort();
        blocked
    }

    /// Aggregate statistics over all tracked entries.
    pub fn get_statistics(&self) -> ThrottleStatistics {
        ThrottleStatistics::collect(
            &self.store,
            &self.registry,
            self.clock.now(),
            self.fail_open_total.load(Ordering::Relaxed),
        )
    }

    /// Remove every expired entry now, outside the reaper schedule.
    pub fn reap_expired(&self) -> usize {
        self.reaper().sweep()
    }

    /// The category registry.
    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// Number of tracked entries.
    pub fn tracked(&self) -> usize {
        self.store.len()
    }

    /// Start the background reaper on the current tokio runtime.
    ///
    /// Starting a running engine is a no-op; starting a stopped one fails.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running(_) => {
                debug!("Throttle engine already running");
                Ok(())
            }
            Lifecycle::Stopped => Err(ThrottleError::Lifecycle(
                "engine has been stopped".to_string(),
            )),
            Lifecycle::Idle => {
                tokio::runtime::Handle::try_current().map_err(|e| {
                    ThrottleError::Lifecycle(format!("no tokio runtime to run the reaper: {}", e))
                })?;
                *lifecycle = Lifecycle::Running(self.reaper().spawn());
                info!("Throttle engine started");
                Ok(())
            }
        }
    }

    /// Stop the background reaper.
    ///
    /// Signals the reaper and waits for it up to the configured shutdown
    /// timeout, then returns regardless of the join outcome. Request-path
    /// operations keep working after stop; expired entries are simply no
    /// longer reaped in the background.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        if let Lifecycle::Running(handle) = previous {
            handle
                .shutdown(Duration::from_secs(self.config.shutdown_timeout_secs))
                .await;
        }
        info!("Throttle engine stopped");
    }

    /// Whether the background reaper is running.
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    fn reaper(&self) -> Reaper {
        Reaper::new(
            self.store.clone(),
            self.registry.clone(),
            self.clock.clone(),
            Duration::from_secs(self.config.reaper_interval_secs),
            self.config.reaper_batch_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::{ChannelSink, EntryState, ManualClock, NoopSink, Policy, SinkEvent};
    use std::collections::HashMap;
    use std::sync::Barrier;
    use std::thread;

    fn engine_with_clock() -> (ThrottleEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let engine = ThrottleEngine::new(CategoryRegistry::default(), EngineConfig::default())
            .unwrap()
            .with_clock(clock.clone());
        (engine, clock)
    }

    fn attempt_count(engine: &ThrottleEngine, category: Category, identifier: &str) -> u32 {
        engine.snapshot(category, identifier).unwrap().attempt_count
    }

    #[test]
    fn test_login_scenario() {
        let (engine, clock) = engine_with_clock();

        for expected_remaining in [4, 3, 2, 1, 0] {
            let decision = engine.check_and_record(Category::Login, "userA");
            assert!(decision.allowed);
            assert_eq!(decision.remaining_attempts, expected_remaining);
            clock.advance(Duration::from_secs(2));
        }

        let decision = engine.check_and_record(Category::Login, "userA");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, DecisionReason::LimitExceeded);
        assert_eq!(decision.retry_after, Some(Duration::from_secs(1800)));

        clock.advance(Duration::from_secs(1801));
        let decision = engine.check_and_record(Category::Login, "userA");
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 4);
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 1);
    }

    #[test]
    fn test_warning_at_threshold() {
        let (engine, _clock) = engine_with_clock();

        // ceil(5 * 0.8) = 4
        for _ in 0..3 {
            let decision = engine.check_and_record(Category::Login, "userA");
            assert!(!decision.warning);
            assert_eq!(decision.reason, DecisionReason::WithinLimit);
        }
        let decision = engine.check_and_record(Category::Login, "userA");
        assert!(decision.warning);
        assert_eq!(decision.reason, DecisionReason::ApproachingLimit);
        assert_eq!(decision.remaining_attempts, 1);
    }

    #[test]
    fn test_blocked_retry_after_is_non_increasing() {
        let (engine, clock) = engine_with_clock();
        for _ in 0..6 {
            engine.check_and_record(Category::Login, "userA");
        }
        let count = attempt_count(&engine, Category::Login, "userA");

        let mut last = Duration::MAX;
        for _ in 0..10 {
            clock.advance(Duration::from_secs(100));
            let decision = engine.check_and_record(Category::Login, "userA");
            assert!(!decision.allowed);
            assert_eq!(decision.reason, DecisionReason::Blocked);
            let retry_after = decision.retry_after.unwrap();
            assert!(retry_after <= last);
            last = retry_after;
        }

        assert_eq!(last, Duration::from_secs(800));
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), count);
    }

    #[test]
    fn test_block_expiry_starts_fresh_window() {
        let mut policies = HashMap::new();
        for category in Category::ALL {
            // Block shorter than the window
            policies.insert(
                category,
                Policy::new(2, Duration::from_secs(600), Duration::from_secs(60), 1.0).unwrap(),
            );
        }
        let clock = Arc::new(ManualClock::new());
        let engine = ThrottleEngine::new(CategoryRegistry::new(policies), EngineConfig::default())
            .unwrap()
            .with_clock(clock.clone());

        for _ in 0..3 {
            engine.check_and_record(Category::Api, "k");
        }
        assert!(engine.check_and_record(Category::Api, "k").is_denied());

        clock.advance(Duration::from_secs(61));
        let decision = engine.check_and_record(Category::Api, "k");
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 1);
        assert_eq!(attempt_count(&engine, Category::Api, "k"), 1);
    }

    #[test]
    fn test_idle_window_resets() {
        let (engine, clock) = engine_with_clock();
        for _ in 0..4 {
            engine.check_and_record(Category::Login, "userA");
        }

        clock.advance(Duration::from_secs(301));
        let decision = engine.check_and_record(Category::Login, "userA");
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 4);

        // Exactly one window later is still inside the window
        clock.advance(Duration::from_secs(300));
        let decision = engine.check_and_record(Category::Login, "userA");
        assert_eq!(decision.remaining_attempts, 3);
    }

    #[test]
    fn test_categories_and_identifiers_are_independent() {
        let (engine, _clock) = engine_with_clock();
        for _ in 0..6 {
            engine.check_and_record(Category::Login, "userA");
        }
        assert!(engine.check_and_record(Category::Login, "userA").is_denied());
        assert!(engine.check_and_record(Category::Login, "userB").allowed);
        assert!(engine.check_and_record(Category::TwoFactor, "userA").allowed);
    }

    #[test]
    fn test_record_outcome_relief() {
        let (engine, _clock) = engine_with_clock();

        engine.record_outcome(Category::Login, "nobody", true);
        assert_eq!(engine.tracked(), 0);

        engine.check_and_record(Category::Login, "userA");
        engine.record_outcome(Category::Login, "userA", true);
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 1);

        for _ in 0..3 {
            engine.check_and_record(Category::Login, "userA");
        }
        engine.record_outcome(Category::Login, "userA", false);
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 4);
        engine.record_outcome(Category::Login, "userA", true);
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 3);
    }

    #[test]
    fn test_record_outcome_never_unblocks() {
        let (engine, _clock) = engine_with_clock();
        for _ in 0..6 {
            engine.check_and_record(Category::Login, "userA");
        }
        engine.record_outcome(Category::Login, "userA", true);

        let decision = engine.check_and_record(Category::Login, "userA");
        assert_eq!(decision.reason, DecisionReason::Blocked);
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 6);
    }

    #[test]
    fn test_reset_behaves_like_new_identifier() {
        let (engine, _clock) = engine_with_clock();
        for _ in 0..6 {
            engine.check_and_record(Category::Login, "userA");
        }

        assert!(engine.reset(Category::Login, "userA"));
        assert!(!engine.reset(Category::Login, "userA"));

        let decision = engine.check_and_record(Category::Login, "userA");
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 4);
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 1);
    }

    #[test]
    fn test_reset_identifier_clears_all_categories() {
        let (engine, _clock) = engine_with_clock();
        engine.check_and_record(Category::Login, "userA");
        engine.check_and_record(Category::PasswordReset, "userA");
        engine.check_and_record(Category::Login, "userB");

        assert_eq!(engine.reset_identifier("userA"), 2);
        assert_eq!(engine.reset_identifier("userA"), 0);
        assert_eq!(engine.tracked(), 1);
    }

    #[test]
    fn test_get_status_does_not_count() {
        let (engine, clock) = engine_with_clock();

        let status = engine.get_status(Category::Login, "userA").unwrap();
        assert_eq!(status.remaining_attempts, 5);
        assert_eq!(status.attempts, 0);
        assert!(status.resets_in.is_none());
        assert_eq!(engine.tracked(), 0);

        engine.check_and_record(Category::Login, "userA");
        engine.check_and_record(Category::Login, "userA");
        clock.advance(Duration::from_secs(100));

        for _ in 0..3 {
            let status = engine.get_status(Category::Login, "userA").unwrap();
            assert_eq!(status.attempts, 2);
            assert_eq!(status.remaining_attempts, 3);
            assert_eq!(status.resets_in, Some(Duration::from_secs(200)));
            assert!(!status.blocked);
        }
        assert_eq!(attempt_count(&engine, Category::Login, "userA"), 2);

        for _ in 0..4 {
            engine.check_and_record(Category::Login, "userA");
        }
        let status = engine.get_status(Category::Login, "userA").unwrap();
        assert!(status.blocked);
        assert_eq!(status.remaining_attempts, 0);
        assert_eq!(status.retry_after, Some(Duration::from_secs(1800)));

        clock.advance(Duration::from_secs(1800));
        let status = engine.get_status(Category::Login, "userA").unwrap();
        assert!(!status.blocked);
        assert_eq!(status.remaining_attempts, 5);
    }

    #[test]
    fn test_clock_skew_fails_open() {
        let (sink, mut rx) = ChannelSink::channel();
        let (engine, clock) = engine_with_clock();
        let engine = engine.with_sink(Arc::new(sink));

        engine.check_and_record(Category::Login, "userA");
        clock.rewind(Duration::from_secs(30));

        let decision = engine.check_and_record(Category::Login, "userA");
        assert_eq!(decision, Decision::fail_open());
        assert_eq!(engine.get_statistics().fail_open_total, 1);

        let events: Vec<SinkEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], SinkEvent::Failure(f) if f.error.contains("Clock")));
        assert!(matches!(&events[2], SinkEvent::Decision(d) if d.allowed));
    }

    #[test]
    fn test_status_with_unbounded_window() {
        let mut policies = HashMap::new();
        for category in Category::ALL {
            // Built directly to get past the duration cap in Policy::new
            policies.insert(
                category,
                Policy {
                    max_attempts: 3,
                    window: Duration::MAX,
                    block_duration: Duration::from_secs(60),
                    warning_ratio: 0.8,
                },
            );
        }
        let clock = Arc::new(ManualClock::new());
        let engine = ThrottleEngine::new(CategoryRegistry::new(policies), EngineConfig::default())
            .unwrap()
            .with_clock(clock.clone());

        assert!(engine.check_and_record(Category::Login, "alice").allowed);
        clock.advance(Duration::from_secs(30));

        let status = engine.get_status(Category::Login, "alice").unwrap();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.remaining_attempts, 2);
        assert!(!status.blocked);
        assert!(status.resets_in.is_none());
    }

    #[test]
    fn test_missing_policy_fails_open() {
        let mut policies = HashMap::new();
        policies.insert(
            Category::Login,
            Policy::new(5, Duration::from_secs(300), Duration::from_secs(1800), 0.8).unwrap(),
        );
        assert!(ThrottleEngine::new(CategoryRegistry::new(policies.clone()), EngineConfig::default()).is_err());

        let engine =
            ThrottleEngine::new_unchecked(CategoryRegistry::new(policies), EngineConfig::default())
                .unwrap();
        for _ in 0..20 {
            let decision = engine.check_and_record(Category::Financial, "acct");
            assert_eq!(decision.reason, DecisionReason::FailOpen);
        }
        assert_eq!(engine.tracked(), 0);
        assert!(engine.get_status(Category::Financial, "acct").is_err());
    }

    #[test]
    fn test_every_decision_reaches_sink() {
        let (sink, mut rx) = ChannelSink::channel();
        let (engine, _clock) = engine_with_clock();
        let engine = engine.with_sink(Arc::new(sink));

        for _ in 0..6 {
            engine.check_and_record(Category::Login, "userA");
        }

        let decisions: Vec<DecisionEvent> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|event| match event {
                SinkEvent::Decision(decision) => Some(decision),
                SinkEvent::Failure(_) => None,
            })
            .collect();
        assert_eq!(decisions.len(), 6);
        assert!(decisions[..5].iter().all(|d| d.allowed));
        assert_eq!(decisions[5].reason, DecisionReason::LimitExceeded);
        assert_eq!(decisions[5].identifier, "userA");
        assert_eq!(decisions[5].category, Category::Login);
    }

    #[test]
    fn test_concurrent_attempts_never_over_admit() {
        const EXTRA: usize = 27;
        let engine = Arc::new(
            ThrottleEngine::new(CategoryRegistry::default(), EngineConfig::default())
                .unwrap()
                .with_sink(Arc::new(NoopSink)),
        );
        let max_attempts = engine
            .registry()
            .get_policy(Category::Api)
            .unwrap()
            .max_attempts as usize;
        let total = max_attempts + EXTRA;
        let barrier = Arc::new(Barrier::new(total));

        let handles: Vec<_> = (0..total)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    engine.check_and_record(Category::Api, "shared-key").allowed
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(admitted, max_attempts);
        assert_eq!(
            engine.snapshot(Category::Api, "shared-key").unwrap().state,
            EntryState::Blocked
        );
    }

    #[test]
    fn test_blocked_identifiers_and_statistics() {
        let (engine, _clock) = engine_with_clock();
        for identifier in ["mallory", "eve"] {
            for _ in 0..6 {
                engine.check_and_record(Category::Login, identifier);
            }
        }
        engine.check_and_record(Category::Login, "alice");
        engine.check_and_record(Category::Consent, "alice");

        assert_eq!(engine.blocked_identifiers(Category::Login), vec!["eve", "mallory"]);
        assert!(engine.blocked_identifiers(Category::Consent).is_empty());

        let stats = engine.get_statistics();
        assert_eq!(stats.total_tracked, 4);
        assert_eq!(stats.currently_blocked, 2);
        assert_eq!(stats.per_category[&Category::Login].total, 3);
        assert_eq!(stats.per_category[&Category::Consent].total, 1);
    }

    #[test]
    fn test_reap_expired() {
        let (engine, clock) = engine_with_clock();
        engine.check_and_record(Category::Api, "k1");
        for _ in 0..6 {
            engine.check_and_record(Category::Login, "userA");
        }

        clock.advance(Duration::from_secs(61));
        assert_eq!(engine.reap_expired(), 1);
        assert_eq!(engine.tracked(), 1);

        clock.advance(Duration::from_secs(1800));
        assert_eq!(engine.reap_expired(), 1);
        assert_eq!(engine.get_statistics().reaped_total, 2);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let config = EngineConfig {
            reaper_interval_secs: 1,
            ..EngineConfig::default()
        };
        let engine = ThrottleEngine::new(CategoryRegistry::default(), config).unwrap();
        assert!(!engine.is_running());

        engine.start().unwrap();
        engine.start().unwrap();
        assert!(engine.is_running());

        engine.stop().await;
        assert!(!engine.is_running());
        assert!(matches!(engine.start(), Err(ThrottleError::Lifecycle(_))));

        // Request path keeps working after stop
        assert!(engine.check_and_record(Category::Login, "userA").allowed);
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let engine = ThrottleEngine::new(CategoryRegistry::default(), EngineConfig::default()).unwrap();
        assert!(matches!(engine.start(), Err(ThrottleError::Lifecycle(_))));
        assert!(!engine.is_running());
    }
}
