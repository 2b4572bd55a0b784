//! Decision sinks for monitoring and audit collaborators.
//!
//! The engine reports every decision, and every internal failure it absorbed,
//! to a [`DecisionSink`]. Sinks run on the request path, so they must not block.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::category::Category;
use super::decision::{Decision, DecisionReason};

/// A decision as reported to external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionEvent {
    /// The category of the attempt
    pub category: Category,
    /// The throttled subject
    pub identifier: String,
    /// Whether the attempt was allowed
    pub allowed: bool,
    /// Why the engine decided this way
    pub reason: DecisionReason,
    /// Retry-after hint in whole seconds, rounded up (denials only)
    pub retry_after_secs: Option<u64>,
    /// Attempts left in the current window
    pub remaining_attempts: u32,
    /// Wall-clock time of the decision
    pub timestamp: DateTime<Utc>,
}

impl DecisionEvent {
    /// Build an event for a decision made now.
    pub fn new(category: Category, identifier: &str, decision: &Decision) -> Self {
        Self {
            category,
            identifier: identifier.to_string(),
            allowed: decision.allowed,
            reason: decision.reason,
            retry_after_secs: decision.retry_after.map(|retry| {
                retry.as_secs() + u64::from(retry.subsec_nanos() > 0)
            }),
            remaining_attempts: decision.remaining_attempts,
            timestamp: Utc::now(),
        }
    }
}

/// An internal failure the engine absorbed by failing open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEvent {
    /// The category of the attempt
    pub category: Category,
    /// The throttled subject
    pub identifier: String,
    /// Rendered error
    pub error: String,
    /// Wall-clock time of the failure
    pub timestamp: DateTime<Utc>,
}

/// Receiver of engine decisions.
pub trait DecisionSink: Send + Sync {
    /// Called once per `check_and_record` decision.
    fn on_decision(&self, event: &DecisionEvent);

    /// Called when the engine failed internally and allowed the attempt.
    fn on_failure(&self, _event: &FailureEvent) {}
}

/// Sink that writes denials and failures to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn on_decision(&self, event: &DecisionEvent) {
        if !event.allowed {
            info!(
                category = %event.category,
                identifier = %event.identifier,
                reason = ?event.reason,
                retry_after_secs = ?event.retry_after_secs,
                "Attempt denied"
            );
        }
    }

    fn on_failure(&self, event: &FailureEvent) {
        error!(
            category = %event.category,
            identifier = %event.identifier,
            error = %event.error,
            "Throttle failure, attempt allowed"
        );
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DecisionSink for NoopSink {
    fn on_decision(&self, _event: &DecisionEvent) {}
}

/// Events delivered through a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkEvent {
    /// A decision
    Decision(DecisionEvent),
    /// An absorbed failure
    Failure(FailureEvent),
}

/// Sink that forwards events to an unbounded tokio channel.
///
/// Sending never blocks; events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DecisionSink for ChannelSink {
    fn on_decision(&self, event: &DecisionEvent) {
        let _ = self.tx.send(SinkEvent::Decision(event.clone()));
    }

    fn on_failure(&self, event: &FailureEvent) {
        let _ = self.tx.send(SinkEvent::Failure(event.clone()));
    }
}
