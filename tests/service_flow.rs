//! End-to-end tests for the submission gateway, evaluation worker and
//! shutdown pruning. wiremock stands in for the two scoring services; the
//! repository hub is a local stub.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modelboard::app::AppContext;
use modelboard::config::Config;
use modelboard::fingerprint;
use modelboard::hub::ModelHub;
use modelboard::leaderboard::store::LeaderboardStore;
use modelboard::leaderboard::{persist, EvaluationRecord, JobStatus};
use modelboard::submission::{self, SubmitError};
use modelboard::types::SubmissionRequest;
use modelboard::worker::{self, QueueItem};

struct FakeHub {
    repo_size: Option<u64>,
    model_size: Option<u64>,
}

#[async_trait]
impl ModelHub for FakeHub {
    async fn repo_size_bytes(&self, _: &str, _: &str, _: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.repo_size)
    }

    async fn model_size_bytes(&self, _: &str, _: &str, _: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.model_size)
    }
}

fn good_hub() -> FakeHub {
    FakeHub {
        repo_size: Some(100 * 1024 * 1024),
        model_size: Some(1024 * 1024 * 1024),
    }
}

struct Harness {
    ctx: AppContext,
    store: Arc<LeaderboardStore>,
    queue_rx: Option<UnboundedReceiver<QueueItem>>,
    _dir: tempfile::TempDir,
}

fn harness(eval_url: &str, vibe_url: &str, hub: FakeHub) -> Harness {
    let dir = tempfile::TempDir::new().expect("failed to create tempdir");
    let leaderboard_path = dir.path().join("leaderboard.csv");

    let mut config = Config::default();
    config.scoring.eval_url = eval_url.to_string();
    config.scoring.vibe_url = vibe_url.to_string();
    config.scoring.retry_interval_ms = 20;
    config.scoring.retry_deadline_ms = 250;
    config.scoring.restart_timeout_ms = 100;
    config.storage.leaderboard_path = leaderboard_path.to_string_lossy().into_owned();

    let store = Arc::new(LeaderboardStore::open(&leaderboard_path).expect("failed to open store"));
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let ctx = AppContext::new(config, store.clone(), Arc::new(hub), queue_tx);
    Harness {
        ctx,
        store,
        queue_rx: Some(queue_rx),
        _dir: dir,
    }
}

fn request_for(namespace: &str, name: &str, template: &str) -> SubmissionRequest {
    SubmissionRequest {
        hash: fingerprint::regenerate(namespace, name, template, "d1"),
        repo_namespace: namespace.to_string(),
        repo_name: name.to_string(),
        chat_template_type: template.to_string(),
        revision: "main".to_string(),
        competition_id: "d1".to_string(),
    }
}

async fn scoring_server(eval_delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eval_score"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(eval_delay).set_body_json(json!({
                "model_size_score": 1.0,
                "eval_score": 0.5,
                "latency_score": 0.8
            })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vibe_match_score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"vibe_score": 0.9})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

async fn wait_for_status(store: &LeaderboardStore, hash: &str, status: JobStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if store
            .get(hash)
            .map(|row| row.status == status)
            .unwrap_or(false)
        {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {hash} to reach {status}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn fingerprint_mismatch_is_rejected_before_any_row_exists() {
    let h = harness("http://localhost:1", "http://localhost:1", good_hub());
    let mut request = request_for("acme", "tiny-llama", "chatml");
    request.hash = "12345".to_string();

    let error = submission::submit(&h.ctx, request)
        .await
        .expect_err("spoofed hash must be rejected");
    assert!(matches!(error, SubmitError::FingerprintMismatch));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn duplicate_submissions_share_one_row_and_one_queue_slot() {
    let mut h = harness("http://localhost:1", "http://localhost:1", good_hub());
    let request = request_for("acme", "tiny-llama", "chatml");

    let first = submission::submit(&h.ctx, request.clone())
        .await
        .expect("first submit failed");
    let second = submission::submit(&h.ctx, request.clone())
        .await
        .expect("second submit failed");

    assert_eq!(first.status, JobStatus::Queued);
    assert_eq!(second.status, JobStatus::Queued);
    assert_eq!(h.store.len(), 1);

    let mut queue_rx = h.queue_rx.take().expect("queue receiver missing");
    match queue_rx.try_recv() {
        Ok(QueueItem::Job(job)) => assert_eq!(job.hash, request.hash),
        _ => panic!("expected exactly one queued job"),
    }
    assert!(queue_rx.try_recv().is_err(), "duplicate was re-queued");
}

#[tokio::test]
async fn undersized_repo_fails_admission_without_queueing() {
    let mut h = harness(
        "http://localhost:1",
        "http://localhost:1",
        FakeHub {
            repo_size: Some(5 * 1024 * 1024),
            model_size: Some(1024 * 1024 * 1024),
        },
    );
    let request = request_for("acme", "tiny-llama", "chatml");

    let payload = submission::submit(&h.ctx, request.clone())
        .await
        .expect("submit failed");
    assert_eq!(payload.status, JobStatus::Failed);

    let row = h.store.get(&request.hash).expect("row missing");
    assert!(
        row.notes.contains("10485760"),
        "note should mention the size bound: {}",
        row.notes
    );
    let mut queue_rx = h.queue_rx.take().expect("queue receiver missing");
    assert!(queue_rx.try_recv().is_err(), "rejected job reached the queue");
}

#[tokio::test]
async fn unsupported_template_fails_admission() {
    let h = harness("http://localhost:1", "http://localhost:1", good_hub());
    let request = request_for("acme", "tiny-llama", "gguf");

    let payload = submission::submit(&h.ctx, request.clone())
        .await
        .expect("submit failed");
    assert_eq!(payload.status, JobStatus::Failed);
    let row = h.store.get(&request.hash).expect("row missing");
    assert!(row.notes.contains("not supported"), "unexpected note: {}", row.notes);
}

#[tokio::test]
async fn oversized_model_fails_admission_after_quantization_ratio() {
    let max_model = Config::default().admission.max_model_size_bytes;
    let h = harness(
        "http://localhost:1",
        "http://localhost:1",
        FakeHub {
            repo_size: Some(100 * 1024 * 1024),
            // four bytes per quantized byte, so this just exceeds the cap
            model_size: Some(max_model * 4 + 4),
        },
    );
    let request = request_for("acme", "big-llama", "chatml");

    let payload = submission::submit(&h.ctx, request.clone())
        .await
        .expect("submit failed");
    assert_eq!(payload.status, JobStatus::Failed);
    let row = h.store.get(&request.hash).expect("row missing");
    assert!(row.notes.contains("too large"), "unexpected note: {}", row.notes);
}

#[tokio::test]
async fn worker_completes_job_and_persists_terminal_row() {
    let scorers = scoring_server(Duration::ZERO).await;
    let mut h = harness(&scorers.uri(), &scorers.uri(), good_hub());
    let request = request_for("acme", "tiny-llama", "chatml");

    let payload = submission::submit(&h.ctx, request.clone())
        .await
        .expect("submit failed");
    assert_eq!(payload.status, JobStatus::Queued);

    let queue_rx = h.queue_rx.take().expect("queue receiver missing");
    let token = CancellationToken::new();
    let worker_handle = tokio::spawn(worker::run_worker(h.ctx.clone(), queue_rx, token));

    wait_for_status(&h.store, &request.hash, JobStatus::Completed).await;
    let row = h.store.get(&request.hash).expect("row missing");
    assert_eq!(row.model_size_score, Some(1.0));
    assert_eq!(row.qualitative_score, Some(0.5));
    assert_eq!(row.latency_score, Some(0.8));
    assert_eq!(row.vibe_score, Some(0.9));
    let total = row.total_score.expect("total score missing");
    assert!((total - 0.572).abs() < 1e-9, "got {total}");
    assert!(row.notes.is_empty());

    h.ctx.queue.send(QueueItem::Shutdown).expect("worker gone");
    worker_handle.await.expect("worker panicked");

    let persisted = persist::read_csv(h.store.path()).expect("read_csv failed");
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].status, JobStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_run_two_jobs_at_once() {
    let scorers = scoring_server(Duration::from_millis(25)).await;
    let mut h = harness(&scorers.uri(), &scorers.uri(), good_hub());

    let mut requests = Vec::new();
    for i in 0..10 {
        requests.push(request_for("acme", &format!("model-{i}"), "chatml"));
    }

    let mut submits = JoinSet::new();
    for request in requests.clone() {
        let ctx = h.ctx.clone();
        submits.spawn(async move { submission::submit(&ctx, request).await });
    }
    while let Some(result) = submits.join_next().await {
        let payload = result.expect("submit task panicked").expect("submit failed");
        assert_eq!(payload.status, JobStatus::Queued);
    }
    assert_eq!(h.store.len(), 10);

    let queue_rx = h.queue_rx.take().expect("queue receiver missing");
    let token = CancellationToken::new();
    let worker_handle = tokio::spawn(worker::run_worker(h.ctx.clone(), queue_rx, token));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    loop {
        let snapshot = h.store.snapshot();
        let running = snapshot
            .iter()
            .filter(|row| row.status == JobStatus::Running)
            .count();
        assert!(running <= 1, "observed {running} rows RUNNING at once");
        if snapshot.iter().all(|row| row.status == JobStatus::Completed) {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("jobs did not finish in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    h.ctx.queue.send(QueueItem::Shutdown).expect("worker gone");
    worker_handle.await.expect("worker panicked");
}

#[tokio::test]
async fn scorer_failing_past_deadline_fails_job_and_signals_restart() {
    let eval = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eval_score"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model loader crashed"))
        .mount(&eval)
        .await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&eval)
        .await;
    let vibe = scoring_server(Duration::ZERO).await;

    let mut h = harness(&eval.uri(), &vibe.uri(), good_hub());
    let request = request_for("acme", "tiny-llama", "chatml");
    submission::submit(&h.ctx, request.clone())
        .await
        .expect("submit failed");

    let queue_rx = h.queue_rx.take().expect("queue receiver missing");
    let token = CancellationToken::new();
    let worker_handle = tokio::spawn(worker::run_worker(h.ctx.clone(), queue_rx, token));

    wait_for_status(&h.store, &request.hash, JobStatus::Failed).await;
    let row = h.store.get(&request.hash).expect("row missing");
    assert!(row.notes.contains("eval score API"), "unexpected note: {}", row.notes);
    assert!(row.total_score.is_none());

    h.ctx.queue.send(QueueItem::Shutdown).expect("worker gone");
    worker_handle.await.expect("worker panicked");

    let requests = eval
        .received_requests()
        .await
        .expect("request recording disabled");
    assert!(
        requests.iter().any(|r| r.url.path() == "/shutdown"),
        "no restart signal reached the failing scorer"
    );
}

#[tokio::test]
async fn scorer_recovering_within_deadline_still_completes() {
    let eval = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/eval_score"))
        .respond_with(ResponseTemplate::new(500).set_body_string("warming up"))
        .up_to_n_times(2)
        .mount(&eval)
        .await;
    Mock::given(method("POST"))
        .and(path("/eval_score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model_size_score": 1.0,
            "eval_score": 0.5,
            "latency_score": 0.8
        })))
        .mount(&eval)
        .await;
    Mock::given(method("POST"))
        .and(path("/shutdown"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&eval)
        .await;
    let vibe = scoring_server(Duration::ZERO).await;

    let mut h = harness(&eval.uri(), &vibe.uri(), good_hub());
    let request = request_for("acme", "tiny-llama", "chatml");
    submission::submit(&h.ctx, request.clone())
        .await
        .expect("submit failed");

    let queue_rx = h.queue_rx.take().expect("queue receiver missing");
    let token = CancellationToken::new();
    let worker_handle = tokio::spawn(worker::run_worker(h.ctx.clone(), queue_rx, token));

    wait_for_status(&h.store, &request.hash, JobStatus::Completed).await;

    h.ctx.queue.send(QueueItem::Shutdown).expect("worker gone");
    worker_handle.await.expect("worker panicked");
}

#[tokio::test]
async fn shutdown_prunes_nonterminal_rows_and_keeps_terminal_ones() {
    let mut h = harness("http://localhost:1", "http://localhost:1", good_hub());

    for (name, status) in [
        ("queued", JobStatus::Queued),
        ("running", JobStatus::Running),
        ("completed", JobStatus::Completed),
        ("failed", JobStatus::Failed),
    ] {
        let request = request_for("acme", name, "chatml");
        h.store.insert_if_absent(EvaluationRecord::queued(&request));
        if status != JobStatus::Queued {
            h.store.set_status(&request.hash, status, "");
        }
    }
    h.store.flush().expect("flush failed");

    // shutdown: queued work is discarded unprocessed, then non-terminal rows
    // are pruned before the final flush
    let token = CancellationToken::new();
    token.cancel();
    let queue_rx = h.queue_rx.take().expect("queue receiver missing");
    let worker_handle = tokio::spawn(worker::run_worker(h.ctx.clone(), queue_rx, token));
    h.ctx
        .queue
        .send(QueueItem::Job(request_for("acme", "queued", "chatml")))
        .expect("worker gone");
    h.ctx.queue.send(QueueItem::Shutdown).expect("worker gone");
    worker_handle.await.expect("worker panicked");

    assert_eq!(h.store.prune(JobStatus::Queued), 1);
    assert_eq!(h.store.prune(JobStatus::Running), 1);
    h.store.flush().expect("final flush failed");

    let persisted = persist::read_csv(h.store.path()).expect("read_csv failed");
    assert_eq!(persisted.len(), 2);
    assert!(persisted.iter().all(|row| row.status.is_terminal()));
}
