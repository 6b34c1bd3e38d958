use sha2::{Digest, Sha256};

use crate::types::SubmissionRequest;

/// Deterministic identity of a submission. Doubles as an anti-tamper check:
/// the gateway recomputes it and rejects requests whose claimed hash differs.
pub fn regenerate(
    repo_namespace: &str,
    repo_name: &str,
    chat_template_type: &str,
    competition_id: &str,
) -> String {
    let canonical = format!("{repo_namespace}/{repo_name}:{chat_template_type}:{competition_id}");
    let digest = Sha256::digest(canonical.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix).to_string()
}

pub fn matches(request: &SubmissionRequest) -> bool {
    request.hash
        == regenerate(
            &request.repo_namespace,
            &request.repo_name,
            &request.chat_template_type,
            &request.competition_id,
        )
}
