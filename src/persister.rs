use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::leaderboard::store::LeaderboardStore;
use crate::mirror::MirrorClient;

/// Flush the leaderboard on a fixed interval until cancelled. Flush and
/// mirror failures are logged and the loop keeps running.
pub async fn run_persister(
    store: Arc<LeaderboardStore>,
    mirror: Option<MirrorClient>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                debug!("saving leaderboard");
                if let Err(error) = store.flush() {
                    warn!("periodic leaderboard save failed: {error:#}");
                }
                if let Some(mirror) = &mirror {
                    if let Err(error) = mirror.push(&store.snapshot()).await {
                        warn!("leaderboard mirror push failed: {error:#}");
                    }
                }
            }
        }
    }
    info!("periodic persister stopped");
}
