//! Abuse categories protected by the throttling engine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ThrottleError;

/// The class of sensitive operation an attempt belongs to.
///
/// Each category is throttled by its own policy in the
/// [`CategoryRegistry`](super::CategoryRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Password login attempts
    Login,
    /// Generic API calls
    Api,
    /// Password reset requests
    #[serde(alias = "password-reset")]
    PasswordReset,
    /// Two-factor code verification
    #[serde(alias = "two-factor")]
    TwoFactor,
    /// Financial transactions (transfers, payments)
    Financial,
    /// Consent requests
    Consent,
    /// Account registration
    Registration,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 7] = [
        Category::Login,
        Category::Api,
        Category::PasswordReset,
        Category::TwoFactor,
        Category::Financial,
        Category::Consent,
        Category::Registration,
    ];

    /// Get the canonical name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Login => "login",
            Category::Api => "api",
            Category::PasswordReset => "password_reset",
            Category::TwoFactor => "two_factor",
            Category::Financial => "financial",
            Category::Consent => "consent",
            Category::Registration => "registration",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ThrottleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| ThrottleError::Config(format!("unknown category '{}'", s)))
    }
}
