//! Built-in violation listeners.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::info;
use url::Url;

use crate::violation::{Listener, Violation};

/// Records every violation as one structured `info` log line.
#[derive(Debug, Default)]
pub struct AuditListener;

#[async_trait]
impl Listener for AuditListener {
    fn name(&self) -> &str {
        "audit"
    }

    async fn on_violation(&self, violation: &Violation) -> anyhow::Result<()> {
        info!(
            policy = %violation.policy.name,
            rule = %violation.policy.rule,
            kind = %violation.resource.kind,
            namespace = %violation.resource.namespace,
            name = %violation.resource.name,
            severity = %violation.policy.severity,
            updated = violation.updated,
            event_uid = %violation.event.uid,
            "policy violation"
        );
        Ok(())
    }
}

/// POSTs each violation as JSON to an external store.
///
/// Every request is bounded by the configured timeout so a stalled endpoint
/// delays the pipeline by at most that long per violation. Failures are not
/// retried.
#[derive(Debug, Clone)]
pub struct RestForwarder {
    client: reqwest::Client,
    url: Url,
}

impl RestForwarder {
    /// Build a forwarder targeting `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is invalid or the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let url = Url::parse(url).with_context(|| format!("invalid forward url {url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build forward HTTP client")?;
        Ok(Self { client, url })
    }

    /// Target endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Listener for RestForwarder {
    fn name(&self) -> &str {
        "rest-forwarder"
    }

    async fn on_violation(&self, violation: &Violation) -> anyhow::Result<()> {
        self.client
            .post(self.url.clone())
            .json(violation)
            .send()
            .await
            .with_context(|| format!("failed to POST violation to {}", self.url))?
            .error_for_status()
            .with_context(|| format!("{} rejected violation", self.url))?;
        Ok(())
    }
}

/// Metric name prefix for everything [`MetricsListener`] registers.
const METRICS_PREFIX: &str = "tripwire";

/// Counts violations in a private Prometheus registry.
///
/// Exposes `tripwire_policy_violations_total{policy, rule, severity, kind, updated}`.
#[derive(Clone)]
pub struct MetricsListener {
    registry: Registry,
    violations: IntCounterVec,
}

impl MetricsListener {
    /// Create the registry and register the violation counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the counter cannot be created or registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some(METRICS_PREFIX.to_owned()), None)
            .context("failed to create metrics registry")?;
        let violations = IntCounterVec::new(
            Opts::new("policy_violations_total", "Blocked admission requests by policy rule"),
            &["policy", "rule", "severity", "kind", "updated"],
        )
        .context("failed to create violation counter")?;
        registry
            .register(Box::new(violations.clone()))
            .context("failed to register violation counter")?;
        Ok(Self {
            registry,
            violations,
        })
    }

    /// Render all metrics in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn export(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("failed to encode metrics")?;
        String::from_utf8(buffer).context("metrics output is not valid UTF-8")
    }
}

#[async_trait]
impl Listener for MetricsListener {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn on_violation(&self, violation: &Violation) -> anyhow::Result<()> {
        let updated = if violation.updated { "true" } else { "false" };
        self.violations
            .get_metric_with_label_values(&[
                violation.policy.name.as_str(),
                violation.policy.rule.as_str(),
                violation.policy.severity.as_str(),
                violation.resource.kind.as_str(),
                updated,
            ])
            .context("invalid violation metric labels")?
            .inc();
        Ok(())
    }
}
