//! In-order, in-process fan-out of violations to registered listeners.
//!
//! [`ViolationPublisher::publish`] awaits each listener in registration order
//! on the caller's task. There is no queue: a slow listener holds up the
//! event watcher, which is how memory stays bounded. Listeners that talk to
//! the network must bound their own latency.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, warn};

use super::Violation;

/// A consumer of published violations.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "listener"
    }

    /// Handle one violation.
    ///
    /// # Errors
    ///
    /// Any error is logged by the publisher; delivery to the remaining
    /// listeners continues.
    async fn on_violation(&self, violation: &Violation) -> anyhow::Result<()>;
}

/// Adapts a plain closure into a [`Listener`].
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&Violation) + Send + Sync,
{
    /// Wrap `f` under `name`.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Listener for FnListener<F>
where
    F: Fn(&Violation) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_violation(&self, violation: &Violation) -> anyhow::Result<()> {
        (self.f)(violation);
        Ok(())
    }
}

/// Broadcasts each violation to every registered listener exactly once.
#[derive(Default)]
pub struct ViolationPublisher {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl ViolationPublisher {
    /// Create a publisher with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Registration order is invocation order.
    pub fn register_listener(&self, listener: Arc<dyn Listener>) {
        debug!(listener = listener.name(), "listener registered");
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Register a closure as a listener.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Violation) + Send + Sync + 'static,
    {
        self.register_listener(Arc::new(FnListener::new(name, f)));
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `violation` to every listener in registration order.
    ///
    /// A listener that returns an error or panics is logged and skipped.
    /// Returns the number of listeners that handled the violation.
    pub async fn publish(&self, violation: &Violation) -> usize {
        let listeners: Vec<Arc<dyn Listener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered: usize = 0;
        for listener in &listeners {
            match AssertUnwindSafe(listener.on_violation(violation))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => delivered = delivered.saturating_add(1),
                Ok(Err(e)) => {
                    warn!(
                        listener = listener.name(),
                        policy = %violation.policy.name,
                        event = %violation.event.uid,
                        error = %e,
                        "listener failed to handle violation"
                    );
                }
                Err(_) => {
                    error!(
                        listener = listener.name(),
                        policy = %violation.policy.name,
                        event = %violation.event.uid,
                        "listener panicked while handling violation"
                    );
                }
            }
        }
        delivered
    }
}
