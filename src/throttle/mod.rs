//! Throttling logic and state management.

mod category;
mod clock;
mod decision;
mod engine;
mod entry;
mod key;
mod reaper;
mod registry;
mod sink;
mod stats;
mod store;

pub use category::Category;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, DecisionReason, ThrottleStatus};
pub use engine::ThrottleEngine;
pub use entry::{EntrySnapshot, EntryState, WindowEntry};
pub use key::ThrottleKey;
pub use reaper::{Reaper, ReaperHandle};
pub use registry::{CategoryRegistry, Policy, DEFAULT_WARNING_RATIO, MAX_POLICY_DURATION};
pub use sink::{ChannelSink, DecisionEvent, DecisionSink, FailureEvent, NoopSink, SinkEvent, TracingSink};
pub use stats::{CategoryStatistics, ThrottleStatistics};
pub use store::CounterStore;
