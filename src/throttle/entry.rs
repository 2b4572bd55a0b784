//! Per-key window entries and their state machine.

use serde::Serialize;
use std::time::{Duration, Instant};

use super::category::Category;
use super::decision::Decision;
use super::registry::Policy;
use crate::error::{Result, ThrottleError};

/// Where an entry sits in its lifecycle.
///
/// `Fresh -> Tracking -> Warning -> Blocked`, and back to `Fresh` once the
/// window or block has run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// The window has elapsed; the next attempt starts over
    Fresh,
    /// Counting attempts below the warning threshold
    Tracking,
    /// Counting attempts at or past the warning threshold
    Warning,
    /// All attempts are denied until the block lifts
    Blocked,
}

/// Mutable attempt record for one (category, identifier) pair.
///
/// Owned exclusively by the counter store; callers only ever see clones or
/// [`EntrySnapshot`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    /// The throttled subject
    pub identifier: String,
    /// Attempts counted in the current window
    pub attempt_count: u32,
    /// When the current window started
    pub window_start: Instant,
    /// When the last attempt was observed
    pub last_attempt: Instant,
    /// End of the current block, if one was recorded
    pub blocked_until: Option<Instant>,
}

impl WindowEntry {
    /// Create an entry for a first observed attempt.
    pub fn new(identifier: &str, now: Instant) -> Self {
        Self {
            identifier: identifier.to_string(),
            attempt_count: 1,
            window_start: now,
            last_attempt: now,
            blocked_until: None,
        }
    }

    /// Record an attempt against an existing entry and decide on it.
    pub fn record_attempt(&mut self, policy: &Policy, now: Instant) -> Result<Decision> {
        let decision = self.evaluate(policy, now);
        self.last_attempt = now;
        decision
    }

    fn evaluate(&mut self, policy: &Policy, now: Instant) -> Result<Decision> {
        if let Some(blocked_until) = self.blocked_until {
            if now < blocked_until {
                // Denied retries are not counted, so they cannot extend the block
                return Ok(Decision::blocked(blocked_until - now));
            }
            self.restart(now);
            return Ok(policy.classify(self.attempt_count));
        }

        let elapsed = self.elapsed_in_window(now)?;
        if elapsed > policy.window {
            self.restart(now);
            return Ok(policy.classify(self.attempt_count));
        }

        // The entry is only mutated once the block deadline is known
        let attempt_count = self.attempt_count.saturating_add(1);
        if attempt_count > policy.max_attempts {
            let blocked_until = now.checked_add(policy.block_duration).ok_or_else(|| {
                ThrottleError::Clock("block deadline overflows the clock".to_string())
            })?;
            self.attempt_count = attempt_count;
            self.blocked_until = Some(blocked_until);
            return Ok(Decision::limit_exceeded(policy.block_duration));
        }

        self.attempt_count = attempt_count;
        Ok(policy.classify(self.attempt_count))
    }

    /// Give back one attempt after a successful outcome.
    ///
    /// Never drops below one attempt and never touches a blocked entry.
    /// Returns whether the count changed.
    pub fn relieve(&mut self) -> bool {
        if self.blocked_until.is_some() || self.attempt_count <= 1 {
            return false;
        }
        self.attempt_count -= 1;
        true
    }

    /// Whether a block is in effect at `now`.
    pub fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Whether the reaper may delete this entry.
    ///
    /// The window must have elapsed and no block may still be running. An
    /// entry whose window starts in the future (clock skew) is kept.
    pub fn is_reapable(&self, policy: &Policy, now: Instant) -> bool {
        if self.is_blocked(now) {
            return false;
        }
        match now.checked_duration_since(self.window_start) {
            Some(elapsed) => elapsed > policy.window,
            None => false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self, policy: &Policy, now: Instant) -> EntryState {
        if self.is_blocked(now) {
            return EntryState::Blocked;
        }
        if self.blocked_until.is_some() || self.window_elapsed(policy, now) {
            return EntryState::Fresh;
        }
        if self.attempt_count >= policy.warning_threshold() {
            EntryState::Warning
        } else {
            EntryState::Tracking
        }
    }

    /// Produce an owned, serializable view of this entry.
    pub fn snapshot(&self, category: Category, policy: &Policy, now: Instant) -> EntrySnapshot {
        EntrySnapshot {
            category,
            identifier: self.identifier.clone(),
            state: self.state(policy, now),
            attempt_count: self.attempt_count,
            window_age: now.saturating_duration_since(self.window_start),
            idle_for: now.saturating_duration_since(self.last_attempt),
            blocked_for: self
                .blocked_until
                .map(|until| until.saturating_duration_since(now))
                .filter(|remaining| !remaining.is_zero()),
        }
    }

    fn window_elapsed(&self, policy: &Policy, now: Instant) -> bool {
        now.checked_duration_since(self.window_start)
            .is_some_and(|elapsed| elapsed > policy.window)
    }

    fn elapsed_in_window(&self, now: Instant) -> Result<Duration> {
        now.checked_duration_since(self.window_start).ok_or_else(|| {
            ThrottleError::Clock(format!(
                "clock reading is {:?} before window start",
                self.window_start - now
            ))
        })
    }

    fn restart(&mut self, now: Instant) {
        self.attempt_count = 1;
        self.window_start = now;
        self.blocked_until = None;
    }
}

/// Read-only view of a window entry for introspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySnapshot {
    /// The entry's category
    pub category: Category,
    /// The throttled subject
    pub identifier: String,
    /// Lifecycle state at snapshot time
    pub state: EntryState,
    /// Attempts counted in the current window
    pub attempt_count: u32,
    /// Time since the current window started
    pub window_age: Duration,
    /// Time since the last attempt
    pub idle_for: Duration,
    /// Time left on the block, if one is running
    pub blocked_for: Option<Duration>,
}
