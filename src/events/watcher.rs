//! Event watcher: filters admission events, enriches them, publishes violations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use k8s_openapi::api::core::v1::Event;
use kube::runtime::watcher;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::ClusterEvent;
use crate::informer::{wait_for_sync, Informer, ResourceHandler, WatchError};
use crate::policy::PolicyStore;
use crate::violation::{convert, ViolationPublisher};

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A violation was published.
    Published,
    /// Not a blocked request, or observed before start-up.
    Ignored,
    /// Qualified, but the policy was unknown or the text unparsable.
    Dropped,
}

/// Turns blocked-admission events into published violations.
///
/// Events that already existed when the watcher was created are not
/// republished: adds are gated on the creation time, updates on the
/// last-observed time, both against the start-up time.
pub struct EventWatcher {
    policies: Arc<PolicyStore>,
    publisher: Arc<ViolationPublisher>,
    start_up: DateTime<Utc>,
}

impl EventWatcher {
    /// Create a watcher whose start-up time is now.
    pub fn new(policies: Arc<PolicyStore>, publisher: Arc<ViolationPublisher>) -> Self {
        Self::with_start_time(policies, publisher, Utc::now())
    }

    /// Create a watcher with an explicit start-up time.
    pub fn with_start_time(
        policies: Arc<PolicyStore>,
        publisher: Arc<ViolationPublisher>,
        start_up: DateTime<Utc>,
    ) -> Self {
        Self {
            policies,
            publisher,
            start_up,
        }
    }

    /// Start consuming `stream` and wait for the initial event list.
    ///
    /// On success the informer keeps running in the background until the
    /// shutdown signal fires; the returned handle completes when it stops.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::SyncFailed`] if shutdown fires, or the stream
    /// ends, before the initial list completes.
    pub async fn run<S>(
        self: Arc<Self>,
        stream: S,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, WatchError>
    where
        S: Stream<Item = Result<watcher::Event<Event>, watcher::Error>> + Send + 'static,
    {
        let informer = Informer::new("events");
        let mut synced = informer.synced();
        let mut stop = shutdown_rx.clone();

        let handle = tokio::spawn(informer.run(stream, self, shutdown_rx));

        if wait_for_sync(&mut synced, &mut stop).await {
            info!("event watcher synced");
            Ok(handle)
        } else {
            Err(WatchError::SyncFailed {
                resource: "events".to_owned(),
            })
        }
    }

    /// Handle a newly observed event.
    pub async fn handle_add(&self, event: &ClusterEvent) -> Outcome {
        if !event.is_blocked() || !self.observed_since_start_up(event.creation_timestamp) {
            return Outcome::Ignored;
        }
        self.dispatch(event, false).await
    }

    /// Handle an update to a known event.
    pub async fn handle_update(&self, event: &ClusterEvent) -> Outcome {
        if !event.is_blocked() || !self.observed_since_start_up(event.last_timestamp) {
            return Outcome::Ignored;
        }
        self.dispatch(event, true).await
    }

    fn observed_since_start_up(&self, at: Option<DateTime<Utc>>) -> bool {
        at.is_some_and(|at| at >= self.start_up)
    }

    async fn dispatch(&self, event: &ClusterEvent, updated: bool) -> Outcome {
        let Some(policy) = self.policies.get(&event.involved_object_uid) else {
            error!(
                policy = %event.involved_object_name,
                uid = %event.involved_object_uid,
                "policy not found"
            );
            return Outcome::Dropped;
        };

        let violation = match convert(event, &policy, updated) {
            Ok(v) => v,
            Err(e) => {
                error!(event = %event.name, error = %e, "failed to convert policy violation event");
                return Outcome::Dropped;
            }
        };

        let delivered = self.publisher.publish(&violation).await;
        debug!(
            policy = %violation.policy.name,
            rule = %violation.policy.rule,
            updated,
            delivered,
            "violation published"
        );
        Outcome::Published
    }
}

#[async_trait]
impl ResourceHandler<Event> for EventWatcher {
    async fn on_add(&self, obj: &Event) {
        self.handle_add(&ClusterEvent::from(obj)).await;
    }

    async fn on_update(&self, _old: &Event, new: &Event) {
        self.handle_update(&ClusterEvent::from(new)).await;
    }
}
