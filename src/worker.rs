use anyhow::{anyhow, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::AppContext;
use crate::leaderboard::{JobStatus, RecordPatch};
use crate::types::SubmissionRequest;

pub const MODEL_SIZE_SCORE_WEIGHT: f64 = 0.06;
pub const QUALITATIVE_SCORE_WEIGHT: f64 = 0.82;
pub const LATENCY_SCORE_WEIGHT: f64 = 0.06;
pub const VIBE_SCORE_WEIGHT: f64 = 0.06;

/// Items carried by the single-consumer evaluation channel.
pub enum QueueItem {
    Job(SubmissionRequest),
    Shutdown,
}

/// The sole queue consumer. The downstream scorers hold exclusive stateful
/// resources, so exactly one of these runs and jobs are strictly serialized.
/// A failing job is logged and the loop moves on; only `Shutdown` ends it.
pub async fn run_worker(
    ctx: AppContext,
    mut queue: UnboundedReceiver<QueueItem>,
    shutdown: CancellationToken,
) {
    while let Some(item) = queue.recv().await {
        match item {
            QueueItem::Shutdown => {
                info!("evaluation worker received shutdown");
                break;
            }
            QueueItem::Job(request) if shutdown.is_cancelled() => {
                info!("discarding queued submission {} during shutdown", request.hash);
            }
            QueueItem::Job(request) => {
                let hash = request.hash.clone();
                if let Err(err) = run_job(&ctx, request).await {
                    error!("evaluation of {hash} failed: {err:#}");
                }
            }
        }
    }
    info!("evaluation worker stopped");
}

pub fn total_score(
    model_size_score: f64,
    qualitative_score: f64,
    latency_score: f64,
    vibe_score: f64,
) -> f64 {
    model_size_score * MODEL_SIZE_SCORE_WEIGHT
        + qualitative_score * QUALITATIVE_SCORE_WEIGHT
        + latency_score * LATENCY_SCORE_WEIGHT
        + vibe_score * VIBE_SCORE_WEIGHT
}

/// Two-phase scoring protocol for one submission. Each scorer is treated as
/// disposable: it gets a restart signal after its call whether or not the
/// call succeeded, so leaked model state never crosses jobs.
async fn run_job(ctx: &AppContext, request: SubmissionRequest) -> Result<()> {
    let hash = request.hash.as_str();
    if ctx.store.get(hash).is_none() {
        return Err(anyhow!("submission {hash} not found in the leaderboard"));
    }
    ctx.store
        .set_status(hash, JobStatus::Running, "Model evaluation in progress");
    flush_logged(ctx);

    let eval = match ctx.eval.eval_scores(&request).await {
        Ok(scores) => {
            ctx.eval.restart().await;
            scores
        }
        Err(err) => {
            let notes = format!("Error calling eval score API: {err:#}");
            ctx.store.set_status(hash, JobStatus::Failed, notes.clone());
            flush_logged(ctx);
            ctx.eval.restart().await;
            return Err(anyhow!(notes));
        }
    };

    ctx.store.update(
        hash,
        RecordPatch {
            model_size_score: Some(eval.model_size_score),
            qualitative_score: Some(eval.eval_score),
            latency_score: Some(eval.latency_score),
            notes: Some("Now computing vibe score".to_string()),
            ..Default::default()
        },
    );
    flush_logged(ctx);

    let vibe = match ctx.vibe.vibe_scores(&request).await {
        Ok(scores) => {
            ctx.vibe.restart().await;
            scores
        }
        Err(err) => {
            let notes = format!("Error calling vibe score API: {err:#}");
            ctx.store.set_status(hash, JobStatus::Failed, notes.clone());
            flush_logged(ctx);
            ctx.vibe.restart().await;
            return Err(anyhow!(notes));
        }
    };

    let total = total_score(
        eval.model_size_score,
        eval.eval_score,
        eval.latency_score,
        vibe.vibe_score,
    );
    if !total.is_finite() {
        let notes = format!("Error calculating scores: total is not finite ({total})");
        ctx.store.set_status(hash, JobStatus::Failed, notes.clone());
        flush_logged(ctx);
        return Err(anyhow!(notes));
    }

    ctx.store.update(
        hash,
        RecordPatch {
            model_size_score: Some(eval.model_size_score),
            qualitative_score: Some(eval.eval_score),
            latency_score: Some(eval.latency_score),
            vibe_score: Some(vibe.vibe_score),
            total_score: Some(total),
            status: Some(JobStatus::Completed),
            notes: Some(String::new()),
        },
    );
    if let Err(err) = ctx.store.flush() {
        let notes = format!("Error persisting final result: {err:#}");
        ctx.store.set_status(hash, JobStatus::Failed, notes.clone());
        flush_logged(ctx);
        return Err(anyhow!(notes));
    }

    info!("evaluation of {hash} completed with total score {total:.4}");
    Ok(())
}

fn flush_logged(ctx: &AppContext) {
    if let Err(error) = ctx.store.flush() {
        warn!("failed flushing leaderboard: {error:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::total_score;

    #[test]
    fn weighted_sum_matches_fixed_weights() {
        let total = total_score(1.0, 0.5, 0.8, 0.9);
        assert!((total - 0.572).abs() < 1e-9, "got {total}");
    }
}
