//! Configuration loading and validation.
//!
//! Loads `tripwire.toml` with per-section defaults. All sections use
//! `#[serde(default)]` so a minimal or empty config file is valid.
//! Command-line flags are applied on top through [`CliOverrides`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

/// Top-level Tripwire configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripwireConfig {
    /// Cluster access and event scoping.
    #[serde(default)]
    pub kubernetes: KubernetesConfig,

    /// HTTP API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Blocked-admission event processing.
    #[serde(default)]
    pub block_reports: BlockReportsConfig,

    /// REST forwarding of violations.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Prometheus violation counters.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cluster access and event scoping.
#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesConfig {
    /// Path to a kubeconfig file. In-cluster config is used when unset.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace to watch events in. Empty watches all namespaces.
    #[serde(default)]
    pub event_namespace: String,

    /// Value of the event `source` field emitted by the admission controller.
    #[serde(default = "default_admission_source")]
    pub admission_source: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            event_namespace: String::new(),
            admission_source: default_admission_source(),
        }
    }
}

/// HTTP API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve the `/policies` list endpoint.
    #[serde(default)]
    pub rest_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            rest_enabled: false,
        }
    }
}

/// Blocked-admission event processing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockReportsConfig {
    /// Watch admission events and publish violations.
    #[serde(default)]
    pub enabled: bool,
}

/// REST forwarding of violations to an external store.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    /// Endpoint receiving one JSON `POST` per violation. Disabled when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_forward_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_forward_timeout_secs(),
        }
    }
}

/// Prometheus violation counters served on `/metrics`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Count violations and mount the `/metrics` endpoint.
    #[serde(default)]
    pub enabled: bool,
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rotated JSON log files. Console-only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Values supplied on the command line. `None`/`false` leaves the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// `--kubeconfig`
    pub kubeconfig: Option<PathBuf>,
    /// `--port`
    pub port: Option<u16>,
    /// `--rest-enabled`
    pub rest_enabled: bool,
    /// `--block-reports`
    pub block_reports: bool,
    /// `--metrics-enabled`
    pub metrics_enabled: bool,
    /// `--event-namespace`
    pub event_namespace: Option<String>,
}

impl TripwireConfig {
    /// Apply command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(path) = overrides.kubeconfig {
            self.kubernetes.kubeconfig = Some(path);
        }
        if let Some(port) = overrides.port {
            self.api.port = port;
        }
        if let Some(namespace) = overrides.event_namespace {
            self.kubernetes.event_namespace = namespace;
        }
        self.api.rest_enabled |= overrides.rest_enabled;
        self.block_reports.enabled |= overrides.block_reports;
        self.metrics.enabled |= overrides.metrics_enabled;
    }

    /// Validate that configuration values are within sane bounds.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.api.port != 0, "api.port must be non-zero");
        anyhow::ensure!(
            !self.kubernetes.admission_source.trim().is_empty(),
            "kubernetes.admission_source must not be empty"
        );
        anyhow::ensure!(
            (1..=300).contains(&self.forward.timeout_secs),
            "forward.timeout_secs must be in [1, 300]"
        );
        if let Some(raw) = &self.forward.url {
            let url = Url::parse(raw).with_context(|| format!("invalid forward.url {raw}"))?;
            anyhow::ensure!(
                url.scheme() == "http" || url.scheme() == "https",
                "forward.url must use http or https"
            );
        }
        Ok(())
    }
}

/// Load configuration from a TOML file.
///
/// The result is not validated: command-line overrides may still fix it, so
/// callers run [`TripwireConfig::validate`] after [`TripwireConfig::apply_overrides`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<TripwireConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))
}

// Default value functions for serde.

fn default_admission_source() -> String {
    "kyverno-admission".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_forward_timeout_secs() -> u64 {
    10
}
