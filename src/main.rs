//! Tripwire CLI entry point.
//!
//! `tripwire run` starts the policy watchers, the optional admission event
//! pipeline, and the HTTP API, and runs until SIGINT.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tokio::sync::watch;
use tracing::{info, warn};

use tripwire::api::{self, ApiState};
use tripwire::config::{load_config, CliOverrides, KubernetesConfig, TripwireConfig};
use tripwire::events::{self, EventWatcher};
use tripwire::listeners::{AuditListener, MetricsListener, RestForwarder};
use tripwire::policy::kyverno::PolicyKind;
use tripwire::policy::watcher::{policy_stream, PolicyWatcher};
use tripwire::policy::PolicyStore;
use tripwire::shutdown;
use tripwire::violation::{Listener, ViolationPublisher};

/// Tripwire: Kyverno admission violations as structured records.
#[derive(Parser)]
#[command(name = "tripwire", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the policy watcher, violation pipeline and HTTP API.
    Run(RunArgs),
}

/// Flags for `run`. Each one overrides the config file.
#[derive(Args)]
struct RunArgs {
    /// Absolute path to the kubeconfig file.
    #[arg(short = 'k', long)]
    kubeconfig: Option<PathBuf>,

    /// Target configuration file.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// HTTP port for the API.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Enable the `/policies` REST endpoint.
    #[arg(short = 'r', long)]
    rest_enabled: bool,

    /// Watch blocked admission events and publish violations.
    #[arg(short = 'b', long)]
    block_reports: bool,

    /// Count violations and serve them on `/metrics`.
    #[arg(short = 'm', long)]
    metrics_enabled: bool,

    /// Namespace to watch events in (default: all).
    #[arg(short = 'n', long)]
    event_namespace: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args).await,
    }
}

async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => TripwireConfig::default(),
    };
    config.apply_overrides(CliOverrides {
        kubeconfig: args.kubeconfig,
        port: args.port,
        rest_enabled: args.rest_enabled,
        block_reports: args.block_reports,
        metrics_enabled: args.metrics_enabled,
        event_namespace: args.event_namespace,
    });
    config.validate().context("invalid configuration")?;

    let _logging_guard = tripwire::logging::init(&config.logging)?;

    let client = kube_client(&config.kubernetes).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(shutdown::forward_signal(tokio::signal::ctrl_c(), shutdown_tx));

    let store = Arc::new(PolicyStore::new());

    let mut tasks = PolicyWatcher::run_all(
        Arc::clone(&store),
        vec![
            (
                PolicyKind::ClusterPolicy,
                policy_stream(client.clone(), PolicyKind::ClusterPolicy),
            ),
            (
                PolicyKind::Policy,
                policy_stream(client.clone(), PolicyKind::Policy),
            ),
        ],
        shutdown_rx.clone(),
    )
    .await?;

    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsListener::new()?))
    } else {
        None
    };

    if config.block_reports.enabled {
        let publisher = Arc::new(ViolationPublisher::new());
        publisher.register_listener(Arc::new(AuditListener));
        if let Some(metrics) = &metrics {
            publisher.register_listener(Arc::clone(metrics) as Arc<dyn Listener>);
        }

        if let Some(url) = config.forward.url.as_deref() {
            let forwarder =
                RestForwarder::new(url, Duration::from_secs(config.forward.timeout_secs))?;
            info!(url = %forwarder.url(), "forwarding violations");
            publisher.register_listener(Arc::new(forwarder));
        }

        let stream = events::event_stream(
            client.clone(),
            &config.kubernetes.event_namespace,
            &config.kubernetes.admission_source,
        );
        let watcher = Arc::new(EventWatcher::new(Arc::clone(&store), publisher));
        tasks.push(watcher.run(stream, shutdown_rx.clone()).await?);
        info!(
            namespace = %config.kubernetes.event_namespace,
            "block reports enabled"
        );
    }

    let router = api::router(
        ApiState {
            policies: Arc::clone(&store),
            metrics,
        },
        config.api.rest_enabled,
    );
    api::serve(router, config.api.port, shutdown_rx).await?;

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "watcher task ended abnormally");
        }
    }

    info!("tripwire stopped");
    Ok(())
}

/// Build a client from the configured kubeconfig, or in-cluster/default config.
async fn kube_client(config: &KubernetesConfig) -> anyhow::Result<Client> {
    let kube_config = match &config.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("failed to load kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("failed to infer kubernetes config")?,
    };
    Client::try_from(kube_config).context("failed to build kubernetes client")
}
