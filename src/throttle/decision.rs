//! Admission decisions and read-only status views.

use serde::Serialize;
use std::time::Duration;

use super::category::Category;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Allowed, comfortably below the limit
    WithinLimit,
    /// Allowed, but at or past the policy's warning threshold
    ApproachingLimit,
    /// Denied because this attempt exceeded the limit and started a block
    LimitExceeded,
    /// Denied because a block is still in effect
    Blocked,
    /// Allowed because the engine failed internally
    FailOpen,
}

/// The outcome of a single `check_and_record` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    /// Whether the protected action may proceed
    pub allowed: bool,
    /// Why the engine decided this way
    pub reason: DecisionReason,
    /// How long the caller should wait before retrying (denials only)
    pub retry_after: Option<Duration>,
    /// Attempts left in the current window
    pub remaining_attempts: u32,
    /// Set once the identifier is close to its limit
    pub warning: bool,
}

impl Decision {
    /// An allowed decision below the warning threshold.
    pub fn within_limit(remaining_attempts: u32) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::WithinLimit,
            retry_after: None,
            remaining_attempts,
            warning: false,
        }
    }

    /// An allowed decision at or past the warning threshold.
    pub fn approaching_limit(remaining_attempts: u32) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::ApproachingLimit,
            retry_after: None,
            remaining_attempts,
            warning: true,
        }
    }

    /// A denial for the attempt that crossed the limit.
    pub fn limit_exceeded(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::LimitExceeded,
            retry_after: Some(retry_after),
            remaining_attempts: 0,
            warning: false,
        }
    }

    /// A denial while a block is in effect.
    pub fn blocked(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::Blocked,
            retry_after: Some(retry_after),
            remaining_attempts: 0,
            warning: false,
        }
    }

    /// The decision returned when the engine itself fails.
    ///
    /// Availability wins over enforcement here: the attempt is allowed and
    /// flagged with a warning so callers can tell it apart.
    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::FailOpen,
            retry_after: None,
            remaining_attempts: 0,
            warning: true,
        }
    }

    /// Whether the attempt was denied.
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}

/// A read-only view of an identifier's standing in one category.
///
/// Produced by `get_status`, which never counts as an attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThrottleStatus {
    /// The category this status refers to
    pub category: Category,
    /// Attempts counted in the current window
    pub attempts: u32,
    /// The policy's cap
    pub max_attempts: u32,
    /// Attempts left before the next one is denied
    pub remaining_attempts: u32,
    /// Whether a block is currently in effect
    pub blocked: bool,
    /// Time until the block lifts (when blocked)
    pub retry_after: Option<Duration>,
    /// Time until the current window resets (when tracking)
    pub resets_in: Option<Duration>,
}
