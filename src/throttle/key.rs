//! Counter store keys.

use super::category::Category;

/// A key that uniquely identifies a throttled (category, identifier) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    /// The category of the protected operation
    pub category: Category,
    /// The subject being throttled
    pub identifier: String,
}

impl ThrottleKey {
    /// Create a new key.
    pub fn new(category: Category, identifier: &str) -> Self {
        Self {
            category,
            identifier: identifier.to_string(),
        }
    }
}

impl std::fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category, self.identifier)
    }
}
