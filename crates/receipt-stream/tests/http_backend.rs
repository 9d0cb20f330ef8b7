//! Drives the HTTP transport against an in-process axum backend that speaks
//! the same wire protocol as the stats service.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use receipt_core::event::{EventKind, StatusEvent};
use receipt_core::{DeveloperActivityStats, ReceiptError};
use receipt_stream::{ClientConfig, HttpTransport, JobClient, JobObserver, JobState};
use serde_json::{json, Value};
use tokio_stream::Stream;

// ── Fake backend ──

fn frame(kind: &str, progress: Value, message: &str, data: Value) -> String {
    json!({
        "type": kind,
        "message": message,
        "progress": progress,
        "data": data,
        "timestamp": "2024-01-03T09:15:00.250000"
    })
    .to_string()
}

fn streamed_payload(login: &str) -> Value {
    json!({
        "login": login,
        "name": "The Octocat",
        "avatarUrl": "https://avatars.example.com/u/583231",
        "createdAt": "2011-01-25T18:44:36Z",
        "followers": {"totalCount": 1200},
        "following": {"totalCount": 9},
        "repositories": {"totalCount": 8},
        "total_contributions": 15,
        "daily_commits_data": [
            {"date": "2024-01-01", "count": 3},
            {"date": "2024-01-02", "count": 0},
            {"date": "2024-01-03", "count": 12}
        ],
        "active_days": 2,
        "max_streak": 1,
        "best_day": {"date": "2024-01-03", "count": 12},
        "top_repositories": [
            {"name": "hello-world", "stargazers_count": 2500, "primary_language": null, "updated_at": "2024-01-02T10:00:00Z"}
        ]
    })
}

fn script(username: &str) -> Vec<String> {
    let empty = json!({});
    match username {
        "limited" => vec![
            frame("start", json!(0), "starting", empty.clone()),
            frame("error", json!(20), "오류 발생: rate limited", empty),
        ],
        "flaky" => vec![frame("start", json!(0), "starting", empty)],
        _ => vec![
            frame("start", json!(0), "starting", empty.clone()),
            frame("api_call", json!(20), "profile", empty.clone()),
            frame("processing", json!(66.666), "repositories 2/3", empty.clone()),
            frame("complete", json!(100), "done", empty),
            frame("data", json!(100), "result", streamed_payload(username)),
        ],
    }
}

async fn start_job(Json(body): Json<Value>) -> Response {
    match body["username"].as_str().unwrap_or_default() {
        "ghost" => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "User 'ghost' not found"})),
        )
            .into_response(),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        username => Json(json!({"message": "started", "username": username})).into_response(),
    }
}

async fn stream_job(
    Path(username): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = std::iter::once(Event::default().comment("keep-alive"))
        .chain(script(&username).into_iter().map(|f| Event::default().data(f)))
        .map(Ok);
    Sse::new(tokio_stream::iter(events))
}

async fn fetch_once(Json(body): Json<Value>) -> Json<Value> {
    let username = body["username"].as_str().unwrap_or_default().to_string();
    Json(json!({
        "username": username,
        "name": null,
        "avatar_url": "https://avatars.example.com/u/583231",
        "created_at": "2011-01-25T18:44:36Z",
        "public_repos": 8,
        "followers": 1200,
        "following": 9,
        "total_commits": 15,
        "daily_commits": [{"date": "2024-01-03", "count": 12}]
    }))
}

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/api/github/stats", post(fetch_once))
        .route("/api/github/stats/async", post(start_job))
        .route("/api/github/stats/stream/{username}", get(stream_job));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client_for(base_url: &str) -> JobClient {
    let config = ClientConfig::default().with_base_url(base_url).unwrap();
    JobClient::from_config(config).unwrap()
}

// ── Observer ──

#[derive(Default)]
struct Collected {
    events: Mutex<Vec<StatusEvent>>,
    completed: Mutex<Vec<DeveloperActivityStats>>,
    errors: Mutex<Vec<ReceiptError>>,
}

impl JobObserver for Collected {
    fn on_status_update(&self, event: &StatusEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
    fn on_complete(&self, stats: DeveloperActivityStats) {
        self.completed.lock().unwrap().push(stats);
    }
    fn on_error(&self, error: &ReceiptError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

// ── Tests ──

#[tokio::test]
async fn streams_job_to_completion() {
    let base = spawn_backend().await;
    let observed = Arc::new(Collected::default());
    let mut client = client_for(&base);

    let job = client.submit("octocat", observed.clone()).unwrap();
    assert_eq!(job.wait().await, JobState::Completed);

    let events = observed.events.lock().unwrap().clone();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Start,
            EventKind::ApiCall,
            EventKind::Processing,
            EventKind::Complete,
            EventKind::Data,
        ]
    );
    assert_eq!(events[2].progress, 66);
    assert_eq!(events[2].message, "repositories 2/3");

    let completed = observed.completed.lock().unwrap();
    assert_eq!(completed.len(), 1);
    let stats = &completed[0];
    assert_eq!(stats.username, "octocat");
    assert_eq!(stats.followers, 1200);
    assert_eq!(stats.daily_commits.len(), 3);
    assert_eq!(stats.top_repositories[0].primary_language, None);
    assert!(observed.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn error_event_is_reported_verbatim() {
    let base = spawn_backend().await;
    let observed = Arc::new(Collected::default());
    let mut client = client_for(&base);

    let job = client.submit("limited", observed.clone()).unwrap();
    assert_eq!(job.wait().await, JobState::Failed);

    assert_eq!(
        *observed.errors.lock().unwrap(),
        vec![ReceiptError::ServerReported("오류 발생: rate limited".into())]
    );
    assert!(observed.completed.lock().unwrap().is_empty());
    assert_eq!(observed.events.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn rejected_start_surfaces_detail() {
    let base = spawn_backend().await;
    let observed = Arc::new(Collected::default());
    let mut client = client_for(&base);

    let job = client.submit("ghost", observed.clone()).unwrap();
    assert_eq!(job.wait().await, JobState::Failed);
    assert_eq!(
        *observed.errors.lock().unwrap(),
        vec![ReceiptError::ServerReported("User 'ghost' not found".into())]
    );
    assert!(observed.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn server_error_without_detail_reports_status() {
    let base = spawn_backend().await;
    let observed = Arc::new(Collected::default());
    let mut client = client_for(&base);

    let job = client.submit("broken", observed.clone()).unwrap();
    assert_eq!(job.wait().await, JobState::Failed);
    assert_eq!(
        *observed.errors.lock().unwrap(),
        vec![ReceiptError::Connection("HTTP 500".into())]
    );
}

#[tokio::test]
async fn stream_closing_early_is_a_connection_error() {
    let base = spawn_backend().await;
    let observed = Arc::new(Collected::default());
    let mut client = client_for(&base);

    let job = client.submit("flaky", observed.clone()).unwrap();
    assert_eq!(job.wait().await, JobState::Failed);
    let errors = observed.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ReceiptError::Connection(_)));
}

#[tokio::test]
async fn unreachable_backend_fails_the_job() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let observed = Arc::new(Collected::default());
    let mut client = client_for(&format!("http://{addr}"));
    let job = client.submit("octocat", observed.clone()).unwrap();
    assert_eq!(job.wait().await, JobState::Failed);
    assert!(matches!(
        observed.errors.lock().unwrap().as_slice(),
        [ReceiptError::Connection(_)]
    ));
}

#[tokio::test]
async fn one_shot_fetch_reads_flat_shape() {
    let base = spawn_backend().await;
    let config = ClientConfig::default().with_base_url(&base).unwrap();
    let transport = HttpTransport::new(config).unwrap();

    let stats = transport.fetch_stats_once(" octocat ").await.unwrap();
    assert_eq!(stats.username, "octocat");
    assert_eq!(stats.display_name, "octocat");
    assert_eq!(stats.public_repos, 8);
    assert_eq!(stats.total_commits, 15);
    // summary derived from the samples
    assert_eq!(stats.active_days, 1);
    assert_eq!(stats.best_day.map(|d| d.count), Some(12));

    assert!(matches!(
        transport.fetch_stats_once("  ").await,
        Err(ReceiptError::InvalidInput(_))
    ));
}
