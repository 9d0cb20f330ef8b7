//! Job streaming client.
//!
//! `submit` validates the identifier, spawns one driver task and returns a
//! [`JobHandle`]. The driver sends the start request, opens the event stream,
//! forwards every event to the observer and finishes with exactly one of
//! `on_complete` / `on_error`, unless the job was cancelled first.
//!
//! Every callback is gated on the job state, and state changes go through a
//! check-and-set against the transition table, so a cancelled job stays
//! silent even when a start response or frame was already in flight. The
//! guarantee is strict on a current-thread runtime. On a multi-threaded
//! runtime a callback that had already begun when `cancel` ran still finishes.

use std::sync::Arc;
use std::time::Duration;

use receipt_core::event::{decode_event, EventKind, StatusEvent};
use receipt_core::reconstruct::reconstruct_event;
use receipt_core::{DeveloperActivityStats, ReceiptError, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::progress::ProgressTracker;
use crate::state::{is_valid_transition, JobState};
use crate::transport::{EventStream, HttpTransport, JobTransport};

/// Receives the outcome of a job. Called from the driver task.
pub trait JobObserver: Send + Sync {
    /// Every received event in server order, terminal ones included.
    fn on_status_update(&self, event: &StatusEvent);
    fn on_complete(&self, stats: DeveloperActivityStats);
    fn on_error(&self, error: &ReceiptError);
}

// ── Handle ──

/// Shared view of one submitted job.
#[derive(Clone)]
pub struct JobHandle {
    identifier: Arc<str>,
    state: Arc<watch::Sender<JobState>>,
    cancel: CancellationToken,
    exited: CancellationToken,
}

impl JobHandle {
    fn new(identifier: &str) -> Self {
        let (state, _) = watch::channel(JobState::Idle);
        Self {
            identifier: Arc::from(identifier),
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            exited: CancellationToken::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop the job. No callback fires afterwards and the stream is closed.
    /// Returns `false` when the job had already finished.
    pub fn cancel(&self) -> bool {
        let cancelled = self.transition(JobState::Cancelled);
        self.cancel.cancel();
        if cancelled {
            info!(identifier = %self.identifier, "job cancelled");
        }
        cancelled
    }

    /// Wait for a terminal state and for the driver to exit.
    ///
    /// When this returns, the terminal callback of a completed or failed job
    /// has already run.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let state = match rx.wait_for(|s| s.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        self.exited.cancelled().await;
        state
    }

    /// Wait until the driver task has exited and released its connection.
    pub async fn settled(&self) {
        self.exited.cancelled().await
    }

    fn transition(&self, to: JobState) -> bool {
        self.state.send_if_modified(|current| {
            if is_valid_transition(*current, to) {
                *current = to;
                true
            } else {
                false
            }
        })
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("identifier", &self.identifier)
            .field("state", &self.state())
            .finish()
    }
}

// ── Client ──

/// Submits jobs and keeps at most one of them in flight.
///
/// Submitting while a job is running cancels that job first.
pub struct JobClient {
    transport: Arc<dyn JobTransport>,
    stream_idle_timeout: Option<Duration>,
    active: Option<JobHandle>,
}

impl JobClient {
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self {
            transport,
            stream_idle_timeout: None,
            active: None,
        }
    }

    /// HTTP client against the configured backend.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let idle = config.stream_idle_timeout;
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport)).with_idle_timeout(idle))
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Start a job for `identifier`. Must be called inside a tokio runtime.
    ///
    /// A blank identifier is rejected here and no callback fires.
    pub fn submit(&mut self, identifier: &str, observer: Arc<dyn JobObserver>) -> Result<JobHandle> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ReceiptError::InvalidInput(
                "identifier must not be empty".into(),
            ));
        }
        if let Some(previous) = self.active.take() {
            if previous.cancel() {
                info!(previous = previous.identifier(), next = identifier, "replacing in-flight job");
            }
        }

        let handle = JobHandle::new(identifier);
        handle.transition(JobState::Requesting);
        info!(identifier, "job submitted");

        let driver = Driver {
            handle: handle.clone(),
            transport: Arc::clone(&self.transport),
            observer,
            idle_timeout: self.stream_idle_timeout,
        };
        tokio::spawn(driver.run());

        self.active = Some(handle.clone());
        Ok(handle)
    }

    /// Cancel the in-flight job, if any.
    pub fn cancel(&mut self) -> bool {
        self.active.take().is_some_and(|job| job.cancel())
    }

    pub fn active(&self) -> Option<&JobHandle> {
        self.active.as_ref()
    }
}

// ── Driver ──

struct Driver {
    handle: JobHandle,
    transport: Arc<dyn JobTransport>,
    observer: Arc<dyn JobObserver>,
    idle_timeout: Option<Duration>,
}

impl Driver {
    async fn run(self) {
        let _exited = self.handle.exited.clone().drop_guard();
        let cancel = self.handle.cancel.clone();
        let identifier = self.handle.identifier().to_string();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            outcome = self.stream_job(&identifier) => outcome,
        };
        // The stream has been dropped by now.
        match outcome {
            Ok(stats) => {
                if self.handle.transition(JobState::Completed) {
                    info!(identifier = %identifier, "job completed");
                    self.observer.on_complete(stats);
                }
            }
            Err(err) => {
                if self.handle.transition(JobState::Failed) {
                    warn!(identifier = %identifier, kind = err.kind(), error = %err, "job failed");
                    self.observer.on_error(&err);
                }
            }
        }
    }

    async fn stream_job(&self, identifier: &str) -> Result<DeveloperActivityStats> {
        self.transport.start_job(identifier).await?;
        debug!(identifier, "start acknowledged");
        let mut stream = self.transport.open_stream(identifier).await?;
        if !self.handle.transition(JobState::Streaming) {
            return Err(ReceiptError::Connection("job no longer active".into()));
        }
        info!(identifier, "stream open");

        let mut progress = ProgressTracker::new();
        loop {
            let frame = self
                .next_frame(&mut *stream)
                .await?
                .ok_or_else(|| {
                    ReceiptError::Connection("stream closed before a terminal event".into())
                })?;
            let mut event = decode_event(&frame)?;
            debug!(
                identifier,
                kind = event.kind.as_str(),
                progress = event.progress,
                "status event"
            );
            progress.observe(&mut event);

            if self.handle.state() != JobState::Streaming {
                return Err(ReceiptError::Connection("job no longer active".into()));
            }
            self.observer.on_status_update(&event);

            match event.kind {
                EventKind::Data => return reconstruct_event(&event),
                EventKind::Error => return Err(ReceiptError::ServerReported(event.message)),
                _ => {}
            }
        }
    }

    async fn next_frame(&self, stream: &mut dyn EventStream) -> Result<Option<String>> {
        match self.idle_timeout {
            None => stream.next_frame().await,
            Some(limit) => tokio::time::timeout(limit, stream.next_frame())
                .await
                .unwrap_or_else(|_| {
                    Err(ReceiptError::Connection(format!("no event for {limit:?}")))
                }),
        }
    }
}
