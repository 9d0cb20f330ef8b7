use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use receipt_core::reconstruct::reconstruct;
use receipt_core::{DeveloperActivityStats, ReceiptError, Result};
use reqwest::header::ACCEPT;
use reqwest::{Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::debug;

use crate::config::ClientConfig;
use crate::sse::SseDecoder;

/// Backend seam. Implemented by [`HttpTransport`] and [`MockTransport`] (tests).
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Ask the backend to start collecting data for `identifier`.
    async fn start_job(&self, identifier: &str) -> Result<()>;

    /// Open the event stream scoped to `identifier`.
    async fn open_stream(&self, identifier: &str) -> Result<Box<dyn EventStream>>;
}

/// An open event stream. Dropping it closes the connection.
#[async_trait]
pub trait EventStream: Send {
    /// Next complete frame, `Ok(None)` once the server has closed the stream.
    async fn next_frame(&mut self) -> Result<Option<String>>;
}

// ── HTTP ──

/// Talks to the stats backend over HTTP + server-sent events.
pub struct HttpTransport {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(connection_error)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Non-streaming path: one request, flat stats payload in the response.
    pub async fn fetch_stats_once(&self, identifier: &str) -> Result<DeveloperActivityStats> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ReceiptError::InvalidInput("identifier must not be empty".into()));
        }
        let url = self.endpoint(&["api", "github", "stats"])?;
        debug!(%url, "fetching stats");
        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .json(&json!({ "username": identifier }))
            .send()
            .await
            .map_err(connection_error)?;
        let body: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ReceiptError::DataFormat(format!("stats response is not JSON: {e}")))?;
        reconstruct(&body)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ReceiptError::InvalidInput(format!("base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| ReceiptError::InvalidInput("base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl JobTransport for HttpTransport {
    async fn start_job(&self, identifier: &str) -> Result<()> {
        let url = self.endpoint(&["api", "github", "stats", "async"])?;
        debug!(%url, "starting job");
        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .json(&json!({ "username": identifier }))
            .send()
            .await
            .map_err(connection_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn open_stream(&self, identifier: &str) -> Result<Box<dyn EventStream>> {
        let url = self.endpoint(&["api", "github", "stats", "stream", identifier])?;
        debug!(%url, "opening stream");
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(connection_error)?;
        let response = check_status(response).await?;
        Ok(Box::new(HttpEventStream {
            response,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            eof: false,
        }))
    }
}

struct HttpEventStream {
    response: Response,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    eof: bool,
}

#[async_trait]
impl EventStream for HttpEventStream {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }
            match self.response.chunk().await.map_err(connection_error)? {
                Some(bytes) => self.pending.extend(self.decoder.push(&bytes)),
                None => {
                    self.eof = true;
                    self.pending.extend(self.decoder.finish());
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// Non-2xx: a JSON `detail` becomes a server-reported error, anything else
/// is reported by status code.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .and_then(|detail| match detail {
            Value::String(s) if !s.trim().is_empty() => Some(s),
            Value::String(_) | Value::Null => None,
            other => Some(other.to_string()),
        });
    match detail {
        Some(detail) => Err(ReceiptError::ServerReported(detail)),
        None => Err(ReceiptError::Connection(format!("HTTP {}", status.as_u16()))),
    }
}

fn connection_error(err: reqwest::Error) -> ReceiptError {
    if err.is_timeout() {
        ReceiptError::Connection("request timed out".into())
    } else {
        ReceiptError::Connection(err.to_string())
    }
}

// ── Mock ──

/// One scripted step of a mock stream.
#[derive(Debug, Clone)]
pub enum MockFrame {
    Frame(String),
    Fail(ReceiptError),
    /// Never yields: the stream stays open until dropped.
    Pending,
}

/// Scripted backend behaviour for one identifier.
#[derive(Debug, Default)]
pub struct MockScript {
    pub start_error: Option<ReceiptError>,
    /// When set, the start request only resolves once notified.
    pub start_gate: Option<Arc<Notify>>,
    pub frames: Vec<MockFrame>,
}

impl MockScript {
    pub fn accepting(frames: Vec<MockFrame>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn rejecting(error: ReceiptError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_start_gate(mut self, gate: Arc<Notify>) -> Self {
        self.start_gate = Some(gate);
        self
    }
}

/// In-memory transport for tests. Identifiers without a script are refused
/// with a connection error.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, MockScript>>,
    starts: Mutex<Vec<String>>,
    opened: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_script(&self, identifier: &str, script: MockScript) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier.to_string(), script);
    }

    /// Identifiers passed to `start_job`, in call order.
    pub fn starts(&self) -> Vec<String> {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Streams opened so far.
    pub fn opened_streams(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet dropped.
    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobTransport for MockTransport {
    async fn start_job(&self, identifier: &str) -> Result<()> {
        self.starts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(identifier.to_string());
        let (gate, outcome) = {
            let scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
            match scripts.get(identifier) {
                Some(script) => (script.start_gate.clone(), script.start_error.clone()),
                None => (
                    None,
                    Some(ReceiptError::Connection("connection refused".into())),
                ),
            }
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        outcome.map_or(Ok(()), Err)
    }

    async fn open_stream(&self, identifier: &str) -> Result<Box<dyn EventStream>> {
        let frames = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(identifier)
            .map(|script| std::mem::take(&mut script.frames))
            .ok_or_else(|| ReceiptError::Connection("connection refused".into()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEventStream {
            frames: frames.into(),
            live: Arc::clone(&self.live),
        }))
    }
}

struct MockEventStream {
    frames: VecDeque<MockFrame>,
    live: Arc<AtomicUsize>,
}

impl Drop for MockEventStream {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStream for MockEventStream {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        match self.frames.pop_front() {
            Some(MockFrame::Frame(frame)) => Ok(Some(frame)),
            Some(MockFrame::Fail(err)) => Err(err),
            Some(MockFrame::Pending) => std::future::pending().await,
            None => Ok(None),
        }
    }
}
