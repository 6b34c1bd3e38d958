use thiserror::Error;
use tracing::{error, warn};

use crate::app::AppContext;
use crate::fingerprint;
use crate::leaderboard::{EvaluationRecord, JobStatus};
use crate::types::{ChatTemplate, SubmissionRequest, SubmissionStatus};
use crate::worker::QueueItem;

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The caller-supplied hash does not match the recomputed fingerprint.
    /// Rejected before any row exists.
    #[error("hash does not match the submission details")]
    FingerprintMismatch,
    #[error("submission disappeared from the leaderboard mid-request")]
    RecordVanished,
}

/// Admission state machine. Dedup-or-insert is atomic inside the store; the
/// slower admission checks run only for freshly inserted rows and never hold
/// the table lock.
pub async fn submit(
    ctx: &AppContext,
    request: SubmissionRequest,
) -> Result<SubmissionStatus, SubmitError> {
    if !fingerprint::matches(&request) {
        return Err(SubmitError::FingerprintMismatch);
    }

    let fresh = ctx.store.insert_if_absent(EvaluationRecord::queued(&request));
    if !fresh {
        return current_payload(ctx, &request.hash);
    }
    flush_logged(ctx);

    if request.chat_template_type.parse::<ChatTemplate>().is_err() {
        return fail(
            ctx,
            &request.hash,
            format!(
                "Chat template type not supported: {}",
                request.chat_template_type
            ),
        );
    }

    let repo_size = match ctx
        .hub
        .repo_size_bytes(&request.repo_namespace, &request.repo_name, &request.revision)
        .await
    {
        Ok(Some(size)) => size,
        Ok(None) => {
            return fail(
                ctx,
                &request.hash,
                "Error checking model repo size. Make sure the model repository exists and is accessible."
                    .to_string(),
            );
        }
        Err(error) => {
            return fail(
                ctx,
                &request.hash,
                format!("Error checking model repo size: {error:#}"),
            );
        }
    };
    let bounds = &ctx.config.admission;
    if repo_size < bounds.min_repo_size_bytes || repo_size > bounds.max_repo_size_bytes {
        return fail(
            ctx,
            &request.hash,
            format!(
                "Model repo size is out of bounds: {repo_size} bytes. Should be less than {} bytes and greater than {} bytes",
                bounds.max_repo_size_bytes, bounds.min_repo_size_bytes
            ),
        );
    }

    let model_size = match ctx
        .hub
        .model_size_bytes(&request.repo_namespace, &request.repo_name, &request.revision)
        .await
    {
        Ok(Some(size)) => size,
        Ok(None) => {
            return fail(
                ctx,
                &request.hash,
                "Error getting model size. Make sure the safetensors index exists and declares metadata.total_size."
                    .to_string(),
            );
        }
        Err(error) => {
            return fail(
                ctx,
                &request.hash,
                format!("Error getting model size: {error:#}"),
            );
        }
    };
    // declared parameter bytes shrink ~4x under quantization before serving
    if model_size / 4 > bounds.max_model_size_bytes {
        return fail(
            ctx,
            &request.hash,
            format!(
                "Model size is too large: {model_size} bytes. Should be less than {} bytes",
                bounds.max_model_size_bytes
            ),
        );
    }

    if ctx.queue.send(QueueItem::Job(request.clone())).is_err() {
        return fail(
            ctx,
            &request.hash,
            "Evaluation queue is shut down".to_string(),
        );
    }
    current_payload(ctx, &request.hash)
}

fn fail(
    ctx: &AppContext,
    hash: &str,
    notes: String,
) -> Result<SubmissionStatus, SubmitError> {
    error!("{notes}");
    ctx.store.set_status(hash, JobStatus::Failed, notes);
    flush_logged(ctx);
    current_payload(ctx, hash)
}

fn current_payload(ctx: &AppContext, hash: &str) -> Result<SubmissionStatus, SubmitError> {
    ctx.store
        .get(hash)
        .map(|record| SubmissionStatus {
            scores: record.scores(),
            status: record.status,
        })
        .ok_or(SubmitError::RecordVanished)
}

fn flush_logged(ctx: &AppContext) {
    if let Err(error) = ctx.store.flush() {
        warn!("failed flushing leaderboard: {error:#}");
    }
}
