//! Abuse Throttle - in-memory abuse throttling engine
//!
//! This crate caps how many times an identifier may attempt a sensitive
//! operation (login, password reset, two-factor verification, financial
//! transaction, ...) within a rolling window, blocks it temporarily once the
//! cap is exceeded, and recovers automatically when the block expires.
//!
//! The entry point is [`throttle::ThrottleEngine`].

pub mod config;
pub mod error;
pub mod throttle;
