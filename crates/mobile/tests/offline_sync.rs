//! Black-box tests of the offline engine against a real HTTP server.
//!
//! Spins an axum server on an ephemeral port, points the production reqwest
//! client at it, and walks the offline → online paths end to end.

use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use fieldserve_core::{JobId, JobStatus, TechnicianId};
use fieldserve_mobile::connectivity::mocks::StaticProbe;
use fieldserve_mobile::{
    HttpJobsApi, MobileState, MobileStore, MutationOutcome, OutboxDrainer, OutboxMethod,
    UploadAsset,
};

/// Marker id the server answers with 404, standing in for a job deleted on
/// the dispatch board while the technician was offline.
const GONE_JOB: &str = "00000000-0000-0000-0000-00000000dead";

#[derive(Debug, Clone, PartialEq)]
enum Recorded {
    StatusUpdate { job: String, body: Value },
    PhotoUpload { job: String, content_type: String, body: Vec<u8> },
}

#[derive(Clone, Default)]
struct ServerState {
    calls: Arc<Mutex<Vec<Recorded>>>,
    jobs: Arc<Mutex<Vec<Value>>>,
}

async fn health() -> &'static str {
    "ok"
}

async fn list_jobs(State(state): State<ServerState>) -> Json<Vec<Value>> {
    Json(state.jobs.lock().unwrap().clone())
}

async fn update_status(
    State(state): State<ServerState>,
    Path(job): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.calls.lock().unwrap().push(Recorded::StatusUpdate {
        job: job.clone(),
        body,
    });

    if job == GONE_JOB {
        (StatusCode::NOT_FOUND, "no such job").into_response()
    } else {
        Json(json!({"ok": true})).into_response()
    }
}

async fn upload_photo(
    State(state): State<ServerState>,
    Path(job): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    state.calls.lock().unwrap().push(Recorded::PhotoUpload {
        job,
        content_type,
        body: body.to_vec(),
    });

    Json(json!({"ok": true})).into_response()
}

struct TestServer {
    base_url: String,
    state: ServerState,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let state = ServerState::default();

        let app = Router::new()
            .route("/health", get(health))
            .route("/technicians/:id/jobs", get(list_jobs))
            .route("/jobs/:id/status", put(update_status))
            .route("/jobs/:id/photos", post(upload_photo))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            state,
            handle,
        }
    }

    fn recorded(&self) -> Vec<Recorded> {
        self.state.calls.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn server_job(id: JobId) -> Value {
    json!({
        "id": id,
        "scheduled_at": Utc.with_ymd_and_hms(2025, 6, 12, 9, 0, 0).unwrap().to_rfc3339(),
        "status": "SCHEDULED",
        "description": "rodent follow-up",
        "client_name": "Okafor",
        "address": "3 Mill Creek Dr",
        "property_notes": "crawlspace access at rear"
    })
}

async fn state_against(server: &TestServer, probe: Arc<StaticProbe>) -> MobileState {
    let store = Arc::new(MobileStore::open_in_memory().await.unwrap());
    let api = Arc::new(HttpJobsApi::new(server.base_url.clone()));
    MobileState::with_components(store, api, probe)
}

#[tokio::test]
async fn queued_put_is_replayed_after_reconnect() {
    let server = TestServer::spawn().await;
    let probe = Arc::new(StaticProbe::offline());
    let state = state_against(&server, probe.clone()).await;

    let job = JobId::new();
    let outcome = state
        .mutations
        .submit(
            OutboxMethod::Put,
            &format!("/jobs/{job}/status"),
            json!({"status": "EN_ROUTE"}),
        )
        .await
        .unwrap();

    assert_eq!(outcome, MutationOutcome::Queued);
    let pending = state.store.pending_mutations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].method, OutboxMethod::Put);

    // Device comes back online; the next drain replays the edit.
    probe.set_connected(true);
    let drainer = OutboxDrainer::new(state.store.clone(), state.api.clone(), probe.clone());
    let report = drainer.drain().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(state.store.pending_count().await.unwrap(), 0);

    let recorded = server.recorded();
    assert_eq!(
        recorded,
        vec![Recorded::StatusUpdate {
            job: job.to_string(),
            body: json!({"status": "EN_ROUTE"}),
        }]
    );
}

#[tokio::test]
async fn rejected_entry_is_dropped_and_queue_keeps_moving() {
    let server = TestServer::spawn().await;
    let probe = Arc::new(StaticProbe::offline());
    let state = state_against(&server, probe.clone()).await;

    let job_a = JobId::new();
    let job_c = JobId::new();
    for (job, status) in [
        (job_a.to_string(), "EN_ROUTE"),
        (GONE_JOB.to_string(), "COMPLETED"),
        (job_c.to_string(), "IN_PROGRESS"),
    ] {
        state
            .mutations
            .submit(
                OutboxMethod::Put,
                &format!("/jobs/{job}/status"),
                json!({ "status": status }),
            )
            .await
            .unwrap();
    }
    assert_eq!(state.store.pending_count().await.unwrap(), 3);

    probe.set_connected(true);
    let drainer = OutboxDrainer::new(state.store.clone(), state.api.clone(), probe.clone());
    let report = drainer.drain().await.unwrap();

    assert_eq!(report.delivered, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(state.store.pending_count().await.unwrap(), 0);

    // The server saw all three, in enqueue order.
    let jobs_seen: Vec<String> = server
        .recorded()
        .into_iter()
        .map(|r| match r {
            Recorded::StatusUpdate { job, .. } => job,
            other => panic!("unexpected call: {other:?}"),
        })
        .collect();
    assert_eq!(
        jobs_seen,
        vec![job_a.to_string(), GONE_JOB.to_string(), job_c.to_string()]
    );

    // The rejected edit is parked, not lost.
    let failed = state.store.failed_mutations().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status_code, Some(404));
}

#[tokio::test]
async fn queued_photo_upload_is_sent_as_multipart() {
    let server = TestServer::spawn().await;
    let probe = Arc::new(StaticProbe::offline());
    let state = state_against(&server, probe.clone()).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"fake-jpeg-bytes").unwrap();

    let job = JobId::new();
    let outcome = state
        .mutations
        .attach_job_photo(
            job,
            UploadAsset {
                uri: format!("file://{}", file.path().display()),
                file_name: "bait-station.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
            },
            Some("north wall bait station".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(outcome, MutationOutcome::Queued);

    probe.set_connected(true);
    let drainer = OutboxDrainer::new(state.store.clone(), state.api.clone(), probe.clone());
    let report = drainer.drain().await.unwrap();
    assert_eq!(report.delivered, 1);

    let recorded = server.recorded();
    assert_eq!(recorded.len(), 1);
    match &recorded[0] {
        Recorded::PhotoUpload {
            job: seen_job,
            content_type,
            body,
        } => {
            assert_eq!(seen_job, &job.to_string());
            assert!(content_type.starts_with("multipart/form-data"));

            let raw = String::from_utf8_lossy(body);
            assert!(raw.contains("name=\"photo\""));
            assert!(raw.contains("bait-station.jpg"));
            assert!(raw.contains("fake-jpeg-bytes"));
            assert!(raw.contains("name=\"caption\""));
            assert!(raw.contains("north wall bait station"));
        }
        other => panic!("unexpected call: {other:?}"),
    }
}

#[tokio::test]
async fn full_cycle_pushes_then_replaces_cache() {
    let server = TestServer::spawn().await;
    let probe = Arc::new(StaticProbe::online());
    let state = state_against(&server, probe.clone()).await;

    let fresh_id = JobId::new();
    *server.state.jobs.lock().unwrap() = vec![server_job(fresh_id)];

    // A leftover edit from an earlier offline stretch.
    let job = JobId::new();
    state
        .store
        .enqueue_mutation(
            &format!("/jobs/{job}/status"),
            OutboxMethod::Put,
            &json!({"status": "COMPLETED"}),
        )
        .await
        .unwrap();

    let technician = TechnicianId::new();
    let summary = state.sync.sync_cycle(technician).await;

    assert!(summary.refreshed);
    assert_eq!(summary.drain.map(|d| d.delivered), Some(1));
    assert_eq!(summary.jobs.len(), 1);
    assert_eq!(summary.jobs[0].id, fresh_id);
    assert_eq!(summary.jobs[0].status, JobStatus::Scheduled);
    assert_eq!(summary.jobs[0].client_name, "Okafor");

    // The full payload, extra fields included, survives into the cache.
    assert_eq!(
        summary.jobs[0].details["property_notes"],
        json!("crawlspace access at rear")
    );

    // Push ran before the pull.
    assert!(matches!(
        server.recorded().first(),
        Some(Recorded::StatusUpdate { .. })
    ));
}

#[tokio::test]
async fn offline_cycle_serves_the_cache() {
    let server = TestServer::spawn().await;

    // Online first, to populate the cache.
    let probe = Arc::new(StaticProbe::online());
    let state = state_against(&server, probe.clone()).await;

    let fresh_id = JobId::new();
    *server.state.jobs.lock().unwrap() = vec![server_job(fresh_id)];

    let technician = TechnicianId::new();
    let summary = state.sync.sync_cycle(technician).await;
    assert!(summary.refreshed);

    // Now the network goes away; the cycle falls back to the cache.
    probe.set_connected(false);
    let offline_summary = state.sync.sync_cycle(technician).await;

    assert!(!offline_summary.refreshed);
    assert_eq!(offline_summary.jobs, summary.jobs);
}
