//! Category policies and the registry that maps categories to them.
//!
//! The registry is built once at startup, validated, and then only read.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info};

use super::category::Category;
use super::decision::Decision;
use crate::config::PolicyConfig;
use crate::error::{Result, ThrottleError};

/// Default share of `max_attempts` at which decisions start carrying a warning.
pub const DEFAULT_WARNING_RATIO: f64 = 0.8;

/// Longest window or block a policy may configure (100 years).
///
/// Anything longer cannot be reliably added to an `Instant`.
pub const MAX_POLICY_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Throttling policy for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Policy {
    /// Attempts allowed within one window
    pub max_attempts: u32,
    /// Length of the counting window
    pub window: Duration,
    /// How long an identifier stays blocked after exceeding the limit
    pub block_duration: Duration,
    /// Fraction of `max_attempts` at which warnings start, in (0, 1]
    pub warning_ratio: f64,
}

impl Policy {
    /// Create a validated policy.
    pub fn new(
        max_attempts: u32,
        window: Duration,
        block_duration: Duration,
        warning_ratio: f64,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(ThrottleError::Config("max_attempts must be at least 1".to_string()));
        }
        if window.is_zero() {
            return Err(ThrottleError::Config("window must be non-zero".to_string()));
        }
        if block_duration.is_zero() {
            return Err(ThrottleError::Config("block_duration must be non-zero".to_string()));
        }
        if window > MAX_POLICY_DURATION || block_duration > MAX_POLICY_DURATION {
            return Err(ThrottleError::Config(format!(
                "window and block_duration must not exceed {}s",
                MAX_POLICY_DURATION.as_secs()
            )));
        }
        if !warning_ratio.is_finite() || warning_ratio <= 0.0 || warning_ratio > 1.0 {
            return Err(ThrottleError::Config(format!(
                "warning_ratio must be in (0, 1], got {}",
                warning_ratio
            )));
        }

        Ok(Self {
            max_attempts,
            window,
            block_duration,
            warning_ratio,
        })
    }

    /// Attempt count at which allowed decisions start carrying a warning.
    pub fn warning_threshold(&self) -> u32 {
        let threshold = (self.max_attempts as f64 * self.warning_ratio).ceil() as u32;
        threshold.max(1).min(self.max_attempts)
    }

    /// Attempts left after `attempt_count` attempts in the current window.
    pub fn remaining(&self, attempt_count: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt_count)
    }

    /// Classify an in-window attempt count that has not exceeded the limit.
    pub fn classify(&self, attempt_count: u32) -> Decision {
        let remaining = self.remaining(attempt_count);
        if attempt_count >= self.warning_threshold() {
            Decision::approaching_limit(remaining)
        } else {
            Decision::within_limit(remaining)
        }
    }

    fn builtin(category: Category) -> Self {
        let (max_attempts, window_secs, block_secs) = match category {
            Category::Login => (5, 300, 1800),
            Category::Api => (100, 60, 300),
            Category::PasswordReset => (3, 3600, 3600),
            Category::TwoFactor => (5, 300, 900),
            Category::Financial => (10, 3600, 3600),
            Category::Consent => (10, 3600, 1800),
            Category::Registration => (3, 3600, 3600),
        };
        Self {
            max_attempts,
            window: Duration::from_secs(window_secs),
            block_duration: Duration::from_secs(block_secs),
            warning_ratio: DEFAULT_WARNING_RATIO,
        }
    }
}

/// Read-only mapping from category to policy.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    policies: BTreeMap<Category, Policy>,
}

impl CategoryRegistry {
    /// Create a registry from explicit policies.
    ///
    /// The registry may be partial; use [`validate_categories`](Self::validate_categories)
    /// to check coverage at startup.
    pub fn new(policies: HashMap<Category, Policy>) -> Self {
        Self {
            policies: policies.into_iter().collect(),
        }
    }

    /// Build a registry from the built-in defaults, overlaid with configured policies.
    pub fn from_config(configured: &HashMap<Category, PolicyConfig>) -> Result<Self> {
        let mut registry = Self::default();

        for (category, policy_config) in configured {
            let policy = policy_config.to_policy().map_err(|e| {
                ThrottleError::Config(format!("invalid policy for '{}': {}", category, e))
            })?;
            debug!(
                category = %category,
                max_attempts = policy.max_attempts,
                window_secs = policy.window.as_secs(),
                block_secs = policy.block_duration.as_secs(),
                "Overriding built-in policy"
            );
            registry.policies.insert(*category, policy);
        }

        info!(categories = registry.policies.len(), "Category registry loaded");
        Ok(registry)
    }

    /// Get the policy for a category.
    pub fn get_policy(&self, category: Category) -> Result<&Policy> {
        self.policies
            .get(&category)
            .ok_or(ThrottleError::UnknownCategory(category))
    }

    /// Ensure every listed category has a policy.
    pub fn validate_categories(&self, categories: &[Category]) -> Result<()> {
        for category in categories {
            self.get_policy(*category)?;
        }
        Ok(())
    }

    /// Iterate over registered categories and their policies, in category order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Policy)> {
        self.policies.iter().map(|(category, policy)| (*category, policy))
    }

    /// Registered categories, in category order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.policies.keys().copied()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self {
            policies: Category::ALL
                .into_iter()
                .map(|category| (category, Policy::builtin(category)))
                .collect(),
        }
    }
}
