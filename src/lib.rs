//! Tripwire: turns blocked Kyverno admission events into policy violations.
//!
//! Watches the cluster's `PolicyViolation` warning events emitted by the
//! Kyverno admission controller, rebuilds structured violation records from
//! the free-text event message, enriches them from an in-memory policy
//! snapshot, and fans them out to registered listeners. The policy snapshot
//! is also served over HTTP.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod events;
pub mod informer;
pub mod listeners;
pub mod logging;
pub mod policy;
pub mod shutdown;
pub mod violation;
