use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use tracing::warn;

use crate::leaderboard::{persist, EvaluationRecord, JobStatus, RecordPatch};

/// Shared leaderboard table. Every access, including snapshots taken by the
/// periodic persister, goes through the one coarse mutex; no method awaits
/// while holding it.
pub struct LeaderboardStore {
    path: PathBuf,
    rows: Mutex<Vec<EvaluationRecord>>,
}

impl LeaderboardStore {
    /// Load the leaderboard from `path`, creating an empty file (header row
    /// only) when absent. A file whose columns do not exactly match the fixed
    /// schema is a fatal startup error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            persist::read_csv(&path)?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            persist::write_csv(&path, &[])?;
            Vec::new()
        };
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EvaluationRecord>> {
        self.rows.lock().expect("leaderboard mutex poisoned")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, hash: &str) -> Option<EvaluationRecord> {
        self.lock().iter().find(|row| row.hash == hash).cloned()
    }

    /// Atomic check-and-insert: returns true only when the hash was unseen
    /// and the row was added. Newest rows sit at the top of the table.
    pub fn insert_if_absent(&self, record: EvaluationRecord) -> bool {
        let mut rows = self.lock();
        if rows.iter().any(|row| row.hash == record.hash) {
            return false;
        }
        rows.insert(0, record);
        true
    }

    /// Merge `patch` into the row for `hash`. Unknown hashes are logged and
    /// ignored; this never fails.
    pub fn update(&self, hash: &str, patch: RecordPatch) {
        let mut rows = self.lock();
        let Some(row) = rows.iter_mut().find(|row| row.hash == hash) else {
            warn!("leaderboard update for unknown hash {hash}");
            return;
        };
        if let Some(value) = patch.model_size_score {
            row.model_size_score = Some(value);
        }
        if let Some(value) = patch.qualitative_score {
            row.qualitative_score = Some(value);
        }
        if let Some(value) = patch.latency_score {
            row.latency_score = Some(value);
        }
        if let Some(value) = patch.vibe_score {
            row.vibe_score = Some(value);
        }
        if let Some(value) = patch.total_score {
            row.total_score = Some(value);
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(notes) = patch.notes {
            row.notes = notes;
        }
    }

    pub fn set_status(&self, hash: &str, status: JobStatus, notes: impl Into<String>) {
        self.update(
            hash,
            RecordPatch {
                status: Some(status),
                notes: Some(notes.into()),
                ..Default::default()
            },
        );
    }

    pub fn snapshot(&self) -> Vec<EvaluationRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every row currently in `status`; returns how many were removed.
    pub fn prune(&self, status: JobStatus) -> usize {
        let mut rows = self.lock();
        let before = rows.len();
        rows.retain(|row| row.status != status);
        before - rows.len()
    }

    /// Serialize the current table to the backing CSV file. Holds the table
    /// lock for the duration of the write so no row mutates mid-snapshot.
    pub fn flush(&self) -> Result<()> {
        let rows = self.lock();
        persist::write_csv(&self.path, &rows)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::leaderboard::store::LeaderboardStore;
    use crate::leaderboard::{EvaluationRecord, JobStatus, RecordPatch};
    use crate::types::SubmissionRequest;

    fn request(hash: &str) -> SubmissionRequest {
        SubmissionRequest {
            repo_namespace: "acme".to_string(),
            repo_name: "tiny-llama".to_string(),
            chat_template_type: "chatml".to_string(),
            hash: hash.to_string(),
            revision: "main".to_string(),
            competition_id: "d1".to_string(),
        }
    }

    fn open_store(dir: &TempDir) -> LeaderboardStore {
        LeaderboardStore::open(dir.path().join("leaderboard.csv")).expect("failed to open store")
    }

    #[test]
    fn insert_if_absent_deduplicates() {
        let dir = TempDir::new().expect("failed to create tempdir");
        let store = open_store(&dir);
        assert!(store.insert_if_absent(EvaluationRecord::queued(&request("1"))));
        assert!(!store.insert_if_absent(EvaluationRecord::queued(&request("1"))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_merges_and_ignores_unknown_hash() {
        let dir = TempDir::new().expect("failed to create tempdir");
        let store = open_store(&dir);
        store.insert_if_absent(EvaluationRecord::queued(&request("1")));

        store.update(
            "1",
            RecordPatch {
                qualitative_score: Some(0.5),
                status: Some(JobStatus::Running),
                ..Default::default()
            },
        );
        let row = store.get("1").expect("row missing");
        assert_eq!(row.qualitative_score, Some(0.5));
        assert_eq!(row.status, JobStatus::Running);
        assert!(row.model_size_score.is_none());

        // unknown hash is a logged no-op
        store.update("999", RecordPatch::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn prune_removes_only_matching_status() {
        let dir = TempDir::new().expect("failed to create tempdir");
        let store = open_store(&dir);
        store.insert_if_absent(EvaluationRecord::queued(&request("1")));
        store.insert_if_absent(EvaluationRecord::queued(&request("2")));
        store.set_status("2", JobStatus::Completed, "");

        assert_eq!(store.prune(JobStatus::Queued), 1);
        assert_eq!(store.prune(JobStatus::Queued), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("2").expect("row missing").status, JobStatus::Completed);
    }
}
