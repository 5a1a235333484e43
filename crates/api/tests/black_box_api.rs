use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::json;

use jobrunner_core::{Job, JobCompletion, JobId, JobOutput};
use jobrunner_infra::jobs::{
    InMemoryJobStore, JobRuntime, JobRuntimeConfig, JobStore, JobStoreError, SharedJobStore,
};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    _runtime: JobRuntime,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(InMemoryJobStore::arc(), runtime_config()).await
    }

    async fn spawn_with(store: SharedJobStore, config: JobRuntimeConfig) -> Self {
        jobrunner_observability::init_for_tests();

        // Same router as prod, bound to an ephemeral port.
        let (jobs, runtime) = JobRuntime::start(store, config);
        let app = jobrunner_api::app::build_app(jobs);
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
            handle,
            _runtime: runtime,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn runtime_config() -> JobRuntimeConfig {
    JobRuntimeConfig::default()
        .with_name("test")
        .with_shell("sh")
        .with_pool_size(4)
}

/// Counts lookups so tests can prove a request never reached the store.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryJobStore,
    gets: AtomicUsize,
}

#[async_trait::async_trait]
impl JobStore for CountingStore {
    async fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        self.inner.insert(job).await
    }

    async fn complete(&self, completion: &JobCompletion) -> Result<(), JobStoreError> {
        self.inner.complete(completion).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(job_id).await
    }

    async fn list(&self) -> Result<Vec<Job>, JobStoreError> {
        self.inner.list().await
    }
}

async fn submit(client: &reqwest::Client, base_url: &str, cmd: &str) -> String {
    let res = client
        .post(format!("{}/job", base_url))
        .json(&json!({ "cmd_string": cmd }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let id: String = res.json().await.unwrap();
    id.parse::<JobId>().expect("response is a job id");
    id
}

async fn get_job(client: &reqwest::Client, base_url: &str, id: &str) -> serde_json::Value {
    let res = client
        .get(format!("{}/job/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn get_finished_eventually(
    client: &reqwest::Client,
    base_url: &str,
    id: &str,
) -> serde_json::Value {
    // Results are persisted asynchronously by the status updater.
    for _ in 0..200 {
        let job = get_job(client, base_url, id).await;
        if job["status"] != "pending" {
            return job;
        }

        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }

    panic!("job {id} did not finish within timeout");
}

fn decoded_output(job: &serde_json::Value) -> Vec<u8> {
    JobOutput::from_encoded(job["output"].as_str().unwrap())
        .unwrap()
        .decode()
        .unwrap()
}

#[tokio::test]
async fn health_check_reports_queue() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(format!("{}/health_check", srv.base_url))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["ok"], 1);
    assert_eq!(body["queued"], 0);
    assert_eq!(body["queue_capacity"], 1024);
}

#[tokio::test]
async fn echo_succeeds_with_encoded_output() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv.base_url, "echo hi").await;
    let job = get_finished_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["job_id"], id);
    assert_eq!(job["cmd_string"], "echo hi");
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["output"], "aGkK");
    assert!(job["worker"].as_str().unwrap().starts_with("test/worker-"));
    assert_eq!(decoded_output(&job), b"hi\n");
}

#[tokio::test]
async fn non_zero_exit_fails() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv.base_url, "exit 3").await;
    let job = get_finished_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["status"], "failed");
    assert_eq!(decoded_output(&job), b"");

    let id = submit(&client, &srv.base_url, "echo oops 1>&2; false").await;
    let job = get_finished_eventually(&client, &srv.base_url, &id).await;

    assert_eq!(job["status"], "failed");
    assert_eq!(decoded_output(&job), b"oops\n");
}

#[tokio::test]
async fn job_is_pending_right_after_submission() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv.base_url, "sleep 1; echo done").await;
    let job = get_job(&client, &srv.base_url, &id).await;

    assert_eq!(job["status"], "pending");
    assert_eq!(job["output"], "");
    assert_eq!(job["worker"], "");

    let job = get_finished_eventually(&client, &srv.base_url, &id).await;
    assert_eq!(job["status"], "succeeded");
    assert_eq!(decoded_output(&job), b"done\n");
}

#[tokio::test]
async fn client_supplied_fields_are_ignored() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let forged = JobId::new().to_string();

    let res = client
        .post(format!("{}/job", srv.base_url))
        .json(&json!({
            "cmd_string": "sleep 1",
            "job_id": forged,
            "status": "succeeded",
            "worker": "me",
            "output": "aGkK",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let id: String = res.json().await.unwrap();

    assert_ne!(id, forged);
    let job = get_job(&client, &srv.base_url, &id).await;
    assert_eq!(job["status"], "pending");
    assert_eq!(job["worker"], "");
    assert_eq!(job["output"], "");
}

#[tokio::test]
async fn missing_or_blank_command_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for body in [json!({}), json!({ "cmd_string": "   " })] {
        let res = client
            .post(format!("{}/job", srv.base_url))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: serde_json::Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }

    let res = client
        .post(format!("{}/job", srv.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let jobs: Vec<serde_json::Value> = client
        .get(format!("{}/job", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn malformed_id_is_client_error_and_store_is_not_queried() {
    let store = Arc::new(CountingStore::default());
    let srv = TestServer::spawn_with(store.clone(), runtime_config()).await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/job/not-a-uuid", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
    assert_eq!(store.gets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/job/{}", srv.base_url, JobId::new()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn concurrent_submissions_all_finish_without_mixing_output() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let submissions = (0..50).map(|i| {
        let client = client.clone();
        let base_url = srv.base_url.clone();
        async move {
            let id = submit(&client, &base_url, &format!("echo job-{i}")).await;
            (i, id)
        }
    });
    let submitted: Vec<(usize, String)> = join_all(submissions).await;

    let ids: HashSet<_> = submitted.iter().map(|(_, id)| id.clone()).collect();
    assert_eq!(ids.len(), 50);

    for (i, id) in &submitted {
        let job = get_finished_eventually(&client, &srv.base_url, id).await;
        assert_eq!(job["status"], "succeeded");
        assert_eq!(decoded_output(&job), format!("job-{i}\n").into_bytes());
    }

    let jobs: Vec<serde_json::Value> = client
        .get(format!("{}/job", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs.len(), 50);
}

#[tokio::test]
async fn saturated_queue_returns_503_without_persisting() {
    let config = runtime_config().with_pool_size(1).with_queue_capacity(1);
    let srv = TestServer::spawn_with(InMemoryJobStore::arc(), config).await;
    let client = reqwest::Client::new();

    submit(&client, &srv.base_url, "sleep 5").await;
    // Let the only worker claim the first job.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    submit(&client, &srv.base_url, "true").await;

    let res = client
        .post(format!("{}/job", srv.base_url))
        .json(&json!({ "cmd_string": "echo refused" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "saturated");

    let jobs: Vec<serde_json::Value> = client
        .get(format!("{}/job", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j["cmd_string"] != "echo refused"));

    let health: serde_json::Value = reqwest::get(format!("{}/health_check", srv.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["queued"], 1);
    assert_eq!(health["queue_capacity"], 1);
}
