//! Local-cache informer over a `kube` list/watch stream.
//!
//! The raw `kube::runtime::watcher` stream only says "this object exists now".
//! [`Informer`] keeps the last seen version of every object and turns the
//! stream into Add / Update / Delete notifications for a [`ResourceHandler`]:
//!
//! - an object seen for the first time is an Add
//! - an object whose resource version changed is an Update
//! - an object re-listed with the same resource version (resync) produces nothing
//! - an object missing from a completed re-list, or explicitly deleted, is a Delete
//!
//! Handlers run one at a time on the task driving [`Informer::run`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use kube::runtime::watcher;
use kube::{Resource, ResourceExt};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Errors from starting a watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The initial list never completed before shutdown or stream end.
    #[error("failed to sync {resource}")]
    SyncFailed {
        /// Name of the informer that failed.
        resource: String,
    },
}

/// Reacts to notifications produced by an [`Informer`].
#[async_trait]
pub trait ResourceHandler<K>: Send + Sync {
    /// A previously unknown object appeared.
    async fn on_add(&self, obj: &K);

    /// A known object changed.
    async fn on_update(&self, old: &K, new: &K);

    /// An object disappeared.
    async fn on_delete(&self, _obj: &K) {}
}

/// Cache-backed translator from watcher events to handler calls.
pub struct Informer<K> {
    name: String,
    cache: HashMap<String, K>,
    relist: Option<HashSet<String>>,
    synced_tx: watch::Sender<bool>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    /// Create an informer. `name` is used in logs and errors.
    pub fn new(name: impl Into<String>) -> Self {
        let (synced_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            cache: HashMap::new(),
            relist: None,
            synced_tx,
        }
    }

    /// Receiver that flips to `true` once the first list has been processed.
    pub fn synced(&self) -> watch::Receiver<bool> {
        self.synced_tx.subscribe()
    }

    /// Drive `stream` until it ends or the shutdown signal is `true`.
    ///
    /// Stream errors are logged and skipped; the `kube` watcher re-lists on
    /// its own after an error.
    pub async fn run<S, H>(mut self, stream: S, handler: Arc<H>, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send,
        H: ResourceHandler<K> + ?Sized,
    {
        let mut stream = std::pin::pin!(stream);
        debug!(informer = %self.name, "informer started");

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(event)) => self.apply(event, handler.as_ref()).await,
                    Some(Err(e)) => {
                        warn!(informer = %self.name, error = %e, "watch stream error");
                    }
                    None => {
                        debug!(informer = %self.name, "watch stream ended");
                        break;
                    }
                },
                // A dropped sender also means shutdown.
                _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
                    info!(informer = %self.name, "informer shutting down");
                    break;
                }
            }
        }
    }

    async fn apply<H>(&mut self, event: watcher::Event<K>, handler: &H)
    where
        H: ResourceHandler<K> + ?Sized,
    {
        match event {
            watcher::Event::Init => {
                self.relist = Some(HashSet::new());
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relist.as_mut() {
                    seen.insert(cache_key(&obj));
                }
                self.upsert(obj, handler).await;
            }
            watcher::Event::InitDone => {
                if let Some(seen) = self.relist.take() {
                    let gone: Vec<String> = self
                        .cache
                        .keys()
                        .filter(|key| !seen.contains(*key))
                        .cloned()
                        .collect();
                    for key in gone {
                        if let Some(obj) = self.cache.remove(&key) {
                            handler.on_delete(&obj).await;
                        }
                    }
                }
                if !self.synced_tx.send_replace(true) {
                    info!(informer = %self.name, objects = self.cache.len(), "informer synced");
                }
            }
            watcher::Event::Apply(obj) => self.upsert(obj, handler).await,
            watcher::Event::Delete(obj) => {
                self.cache.remove(&cache_key(&obj));
                handler.on_delete(&obj).await;
            }
        }
    }

    async fn upsert<H>(&mut self, obj: K, handler: &H)
    where
        H: ResourceHandler<K> + ?Sized,
    {
        match self.cache.insert(cache_key(&obj), obj.clone()) {
            None => handler.on_add(&obj).await,
            Some(old) if old.resource_version() == obj.resource_version() => {
                trace!(informer = %self.name, object = %obj.name_any(), "resync, unchanged");
            }
            Some(old) => handler.on_update(&old, &obj).await,
        }
    }
}

/// Wait until `synced` turns `true` or the shutdown signal fires.
///
/// Returns `false` if shutdown came first or the informer ended unsynced.
pub async fn wait_for_sync(
    synced: &mut watch::Receiver<bool>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        biased;
        result = synced.wait_for(|s| *s) => result.is_ok(),
        _ = shutdown_rx.wait_for(|s| *s) => false,
    }
}

fn cache_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}
