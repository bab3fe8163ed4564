//! Policy violations: the record, its conversion from events, and fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod convert;
pub mod publisher;

pub use convert::{convert, ConvertError};
pub use publisher::{FnListener, Listener, ViolationPublisher};

/// The resource whose admission was blocked, as named in the event text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationResource {
    /// Resource kind, e.g. `Pod`.
    pub kind: String,
    /// Namespace; empty for cluster-scoped resources.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Resource name.
    pub name: String,
}

/// The policy and rule that blocked the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationPolicy {
    /// Policy name.
    pub name: String,
    /// Rule name parsed from the event text.
    pub rule: String,
    /// Resolved violation message.
    pub message: String,
    /// Policy category.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    /// Policy severity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub severity: String,
}

/// Identity of the source event, usable as an idempotency key downstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationEvent {
    /// Event object name.
    pub name: String,
    /// Event object UID.
    pub uid: String,
}

/// A blocked admission request, rebuilt from a Kyverno event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Blocked resource.
    pub resource: ViolationResource,
    /// Blocking policy.
    pub policy: ViolationPolicy,
    /// Event last-observed time. Authoritative ordering key.
    pub timestamp: DateTime<Utc>,
    /// `true` when produced by an event update rather than a new event.
    pub updated: bool,
    /// Source event identity.
    pub event: ViolationEvent,
}
