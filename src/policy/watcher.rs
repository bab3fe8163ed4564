//! Keeps the [`PolicyStore`] in step with Kyverno policy resources.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::kyverno::{parse_policy, PolicyKind};
use super::PolicyStore;
use crate::informer::{wait_for_sync, Informer, ResourceHandler, WatchError};

/// Boxed list/watch stream of policy resources.
pub type PolicyStream = BoxStream<'static, Result<watcher::Event<DynamicObject>, watcher::Error>>;

/// Open a list/watch stream for one policy kind across all namespaces.
pub fn policy_stream(client: Client, kind: PolicyKind) -> PolicyStream {
    let api: Api<DynamicObject> = Api::all_with(client, &kind.api_resource());
    watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed()
}

/// Writes parsed policies into the store as their resources change.
pub struct PolicyWatcher {
    store: Arc<PolicyStore>,
    kind: PolicyKind,
}

impl PolicyWatcher {
    /// Create a watcher for one policy kind.
    pub fn new(store: Arc<PolicyStore>, kind: PolicyKind) -> Self {
        Self { store, kind }
    }

    /// Start one informer per `(kind, stream)` pair and wait for all of them
    /// to complete their initial list.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::SyncFailed`] naming the first kind that did not
    /// sync before shutdown or stream end.
    pub async fn run_all(
        store: Arc<PolicyStore>,
        streams: Vec<(PolicyKind, PolicyStream)>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, WatchError> {
        let mut pending = Vec::with_capacity(streams.len());
        let mut handles = Vec::with_capacity(streams.len());

        for (kind, stream) in streams {
            let informer = Informer::new(kind.as_str());
            pending.push((kind, informer.synced()));
            let handler = Arc::new(Self::new(Arc::clone(&store), kind));
            handles.push(tokio::spawn(informer.run(
                stream,
                handler,
                shutdown_rx.clone(),
            )));
        }

        let mut stop = shutdown_rx;
        for (kind, mut synced) in pending {
            if !wait_for_sync(&mut synced, &mut stop).await {
                return Err(WatchError::SyncFailed {
                    resource: kind.as_str().to_owned(),
                });
            }
        }

        info!(policies = store.len(), "policy watchers synced");
        Ok(handles)
    }

    fn upsert(&self, obj: &DynamicObject) {
        match parse_policy(obj, self.kind) {
            Ok(policy) => {
                debug!(kind = %policy.kind, name = %policy.name, rules = policy.rules.len(), "policy stored");
                self.store.set(policy);
            }
            Err(e) => warn!(error = %e, "skipping policy"),
        }
    }
}

#[async_trait]
impl ResourceHandler<DynamicObject> for PolicyWatcher {
    async fn on_add(&self, obj: &DynamicObject) {
        self.upsert(obj);
    }

    async fn on_update(&self, old: &DynamicObject, new: &DynamicObject) {
        // Same name, new object: recreated while the watch was down.
        if let Some(old_uid) = old.uid().filter(|uid| new.uid().as_ref() != Some(uid)) {
            if self.store.delete(&old_uid).is_some() {
                debug!(kind = self.kind.as_str(), name = %old.name_any(), uid = %old_uid, "replaced recreated policy");
            }
        }
        self.upsert(new);
    }

    async fn on_delete(&self, obj: &DynamicObject) {
        if let Some(uid) = obj.uid() {
            if self.store.delete(&uid).is_some() {
                debug!(kind = self.kind.as_str(), name = %obj.name_any(), "policy removed");
            }
        }
    }
}
