//! vigil-agent binary: loads configuration, wires the components, and
//! runs the control loop until a shutdown signal arrives.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vigil_agent::config::Config;
use vigil_agent::control::{ControlLoop, ControlLoopOptions};
use vigil_agent::executor::RoleExecutor;
use vigil_cluster::{ClusterProbe, RpcClusterQueries};
use vigil_core::DecisionParams;
use vigil_notify::{EventContext, EventType, LogNotifier, Notifier, NotifyManager};

/// Peer-to-peer HA controller for a Solana validator.
#[derive(Parser)]
#[command(name = "vigil-agent", version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "vigil.toml")]
    config: PathBuf,

    /// Log intended actions without spawning any process.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if args.dry_run {
        config.failover.dry_run = true;
    }

    let registry = match config.registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // one token, shared by every component that can block: the rpc
    // client, the executor's subprocess waits, the event sinks, and
    // the loop itself
    let cancel = CancellationToken::new();

    let queries = match RpcClusterQueries::new(
        &config.rpc.url,
        config.validator.public_ip,
        &config.identity.active_pubkey,
        config.rpc.timeout_duration,
        cancel.clone(),
    ) {
        Ok(queries) => queries,
        Err(e) => {
            error!("failed to build rpc client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let probe = ClusterProbe::new(
        Arc::new(queries),
        registry.ips().iter().copied().collect(),
    );

    let sinks: Vec<Arc<dyn Notifier>> = if config.notifications.enabled {
        vec![Arc::new(LogNotifier)]
    } else {
        Vec::new()
    };
    let notify = Arc::new(NotifyManager::new(
        EventContext {
            validator_name: config.validator.name.clone(),
            cluster: config.validator.cluster.clone(),
            public_ip: config.validator.public_ip.to_string(),
            active_pubkey: config.identity.active_pubkey.clone(),
            passive_pubkey: config.identity.passive_pubkey.clone(),
        },
        config.notifications.events.clone(),
        sinks,
        cancel.clone(),
    ));

    info!(
        validator = %config.validator.name,
        cluster = %config.validator.cluster,
        peers = registry.len(),
        rank = ?registry.rank(config.validator.public_ip),
        dry_run = config.failover.dry_run,
        "vigil agent starting"
    );
    notify.emit(
        EventType::Startup,
        "controller started",
        BTreeMap::from([(
            "dry_run".to_string(),
            config.failover.dry_run.to_string(),
        )]),
    );

    let executor = RoleExecutor::new(
        config.failover.active.clone(),
        config.failover.passive.clone(),
        config.template_data(),
        config.failover.dry_run,
        config.failover.stop_timeout_duration,
        cancel.clone(),
    );

    let control = ControlLoop::new(ControlLoopOptions {
        probe,
        executor,
        notify: Arc::clone(&notify),
        registry,
        self_ip: config.validator.public_ip,
        params: DecisionParams {
            leaderless_threshold: config.failover.leaderless_threshold_duration,
            takeover_jitter_max: Duration::from_secs(config.failover.takeover_jitter_seconds),
        },
        poll_interval: config.failover.poll_interval_duration,
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    control.run(cancel).await;

    // let the shutdown event reach the sinks before exiting
    notify.drain().await;
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
