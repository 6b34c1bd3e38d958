use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::hub::{HubClient, ModelHub};
use crate::leaderboard::store::LeaderboardStore;
use crate::leaderboard::JobStatus;
use crate::mirror::MirrorClient;
use crate::persister;
use crate::scoring::ScoringClient;
use crate::server;
use crate::worker::{self, QueueItem};

/// Everything a component needs, constructed once by the supervisor and
/// handed down explicitly. No global state.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<LeaderboardStore>,
    pub hub: Arc<dyn ModelHub>,
    pub eval: ScoringClient,
    pub vibe: ScoringClient,
    pub queue: UnboundedSender<QueueItem>,
}

impl AppContext {
    pub fn new(
        config: Config,
        store: Arc<LeaderboardStore>,
        hub: Arc<dyn ModelHub>,
        queue: UnboundedSender<QueueItem>,
    ) -> Self {
        let eval = ScoringClient::new(&config.scoring.eval_url, "/eval_score", &config.scoring);
        let vibe = ScoringClient::new(
            &config.scoring.vibe_url,
            "/vibe_match_score",
            &config.scoring,
        );
        Self {
            config: Arc::new(config),
            store,
            hub,
            eval,
            vibe,
            queue,
        }
    }
}

/// Cancelled on SIGINT or SIGTERM; all subsystems watch this token.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handler = token.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received ctrl-c, initiating graceful shutdown"),
                _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received ctrl-c, initiating graceful shutdown");
        }
        handler.cancel();
    });
    token
}

/// Top-level supervisor: opens the store, spawns the worker and persister,
/// serves the API until a shutdown signal fires, then runs the coordinated
/// teardown so no QUEUED or RUNNING row survives the process.
pub async fn run(config: Config) -> Result<()> {
    let leaderboard_path = config.resolved_leaderboard_path();
    let store = Arc::new(LeaderboardStore::open(&leaderboard_path)?);
    recover_from_crash(&store)?;

    let bind: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow!("invalid bind address {}:{}: {e}", config.server.host, config.server.port))?;
    let save_period = Duration::from_secs(config.storage.save_interval_secs.max(1));
    let mirror = if config.mirror.url.trim().is_empty() {
        None
    } else {
        Some(MirrorClient::new(config.mirror.url.clone()))
    };
    let hub: Arc<dyn ModelHub> = Arc::new(HubClient::new(&config.hub.base_url));

    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let ctx = AppContext::new(config, store.clone(), hub, queue_tx.clone());

    let shutdown = install_shutdown_handler();
    let persister_token = CancellationToken::new();

    let worker_handle = tokio::spawn(worker::run_worker(ctx.clone(), queue_rx, shutdown.clone()));
    let persister_handle = tokio::spawn(persister::run_persister(
        store.clone(),
        mirror.clone(),
        save_period,
        persister_token.clone(),
    ));

    server::run_server(ctx, bind, shutdown.clone()).await?;

    // Gateway is down; nothing produces queue entries anymore. Drop work
    // that never started, let an in-flight job run to completion, then stop
    // both background tasks before the final flush.
    let dropped = store.prune(JobStatus::Queued);
    if dropped > 0 {
        info!("dropped {dropped} queued submissions that never started");
    }
    if let Err(error) = store.flush() {
        warn!("failed flushing leaderboard during shutdown: {error:#}");
    }

    persister_token.cancel();
    if queue_tx.send(QueueItem::Shutdown).is_err() {
        warn!("evaluation worker already stopped");
    }
    if let Err(error) = worker_handle.await {
        warn!("evaluation worker task failed: {error}");
    }
    if let Err(error) = persister_handle.await {
        warn!("persister task failed: {error}");
    }

    let stale = store.prune(JobStatus::Running);
    if stale > 0 {
        info!("dropped {stale} submissions interrupted mid-evaluation");
    }
    store
        .flush()
        .context("failed writing final leaderboard state")?;
    if let Some(mirror) = &mirror {
        if let Err(error) = mirror.push(&store.snapshot()).await {
            warn!("final leaderboard mirror push failed: {error:#}");
        }
    }
    info!("shutdown complete");
    Ok(())
}

/// Rows left QUEUED or RUNNING by an uncontrolled exit reference jobs that no
/// longer exist; drop them before serving.
fn recover_from_crash(store: &LeaderboardStore) -> Result<()> {
    let dropped = store.prune(JobStatus::Queued) + store.prune(JobStatus::Running);
    if dropped > 0 {
        info!("recovered leaderboard: dropped {dropped} stale non-terminal rows");
        store.flush()?;
    }
    Ok(())
}
