//! Kyverno admission events: the filtered cluster stream and its handlers.
//!
//! Kyverno records every blocked admission request as a core/v1 `Event`
//! with `reason=PolicyViolation`, `type=Warning` and the admission
//! controller as source. [`event_stream`] subscribes to exactly those;
//! [`watcher::EventWatcher`] turns them into violations.

use chrono::{DateTime, Utc};
use futures::Stream;
use k8s_openapi::api::core::v1::Event;
use kube::runtime::{watcher as kube_watcher, WatchStreamExt};
use kube::{Api, Client};

pub mod watcher;

pub use self::watcher::{EventWatcher, Outcome};

/// Substring Kyverno puts in messages for requests it rejected.
pub const BLOCKED_MARKER: &str = "(blocked)";

/// Event `reason` used for policy violations.
pub const VIOLATION_REASON: &str = "PolicyViolation";

/// Event `type` used for policy violations.
pub const VIOLATION_TYPE: &str = "Warning";

/// The parts of a core/v1 `Event` the violation pipeline uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterEvent {
    /// Event object name.
    pub name: String,
    /// Event object UID.
    pub uid: String,
    /// Free-text message.
    pub message: String,
    /// UID of the object the event is about (the policy).
    pub involved_object_uid: String,
    /// Name of the object the event is about.
    pub involved_object_name: String,
    /// When the event object was created.
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// When the event was last observed.
    pub last_timestamp: Option<DateTime<Utc>>,
}

impl ClusterEvent {
    /// Whether the message reports a rejected admission request.
    pub fn is_blocked(&self) -> bool {
        self.message.contains(BLOCKED_MARKER)
    }
}

impl From<&Event> for ClusterEvent {
    fn from(event: &Event) -> Self {
        Self {
            name: event.metadata.name.clone().unwrap_or_default(),
            uid: event.metadata.uid.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
            involved_object_uid: event.involved_object.uid.clone().unwrap_or_default(),
            involved_object_name: event.involved_object.name.clone().unwrap_or_default(),
            creation_timestamp: event.metadata.creation_timestamp.as_ref().map(|t| t.0),
            last_timestamp: event.last_timestamp.as_ref().map(|t| t.0),
        }
    }
}

/// Field selector matching violation events from `admission_source`.
///
/// Keys are sorted, matching the canonical selector form the API server
/// echoes back.
pub fn field_selector(admission_source: &str) -> String {
    format!("reason={VIOLATION_REASON},source={admission_source},type={VIOLATION_TYPE}")
}

/// Open the filtered event list/watch stream.
///
/// An empty `namespace` watches all namespaces. The stream re-lists with
/// backoff after errors.
pub fn event_stream(
    client: Client,
    namespace: &str,
    admission_source: &str,
) -> impl Stream<Item = Result<kube_watcher::Event<Event>, kube_watcher::Error>> + Send + 'static {
    let api: Api<Event> = if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    };
    let config = kube_watcher::Config::default().fields(&field_selector(admission_source));
    kube_watcher::watcher(api, config).default_backoff()
}
