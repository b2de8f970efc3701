#![deny(missing_docs)]
//! Ayumi interaction runtime.
//!
//! Transport-agnostic command dispatching, cooldowns, paginated sessions,
//! reachability probes and the known-peer registry.

/// Configuration management.
pub mod config;
/// Per-user, per-action cooldown admission.
pub mod cooldown;
/// Command routing and handlers.
pub mod dispatcher;
/// Inbound command events.
pub mod event;
/// Known-peer registry gating direct messages.
pub mod peers;
/// Outbound reachability probes.
pub mod probe;
/// Reply payloads and the reply sink interface.
pub mod reply;
/// Paginated interactive sessions.
pub mod session;
/// Points ledger backed by the persistent store.
pub mod stats;
/// Persistent key-value storage (local files or R2).
pub mod storage;

/// In-memory fakes for tests.
#[cfg(test)]
pub mod testing;
