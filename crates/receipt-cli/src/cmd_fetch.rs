use anyhow::{anyhow, bail, Context, Result};
use receipt_core::event::StatusEvent;
use receipt_core::{DeveloperActivityStats, ReceiptError};
use receipt_stream::{ClientConfig, HttpTransport, JobClient, JobObserver, JobState};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cmd_render::{emit_receipt, local_now};

pub struct FetchParams<'a> {
    pub username: &'a str,
    pub api_url: Option<&'a str>,
    pub json: bool,
    pub out: Option<&'a Path>,
    pub save: Option<&'a Path>,
    pub once: bool,
    pub quiet: bool,
}

/// Execute `receipt fetch <username>`
pub fn execute(params: &FetchParams<'_>) -> Result<()> {
    let printed_at = local_now();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = params.api_url {
        config = config.with_base_url(url)?;
    }
    debug!(base_url = %config.base_url, once = params.once, "fetch configured");

    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    // Current-thread runtime: the driver and Ctrl-C handling share one thread.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let stats = rt.block_on(fetch(params, config, cancel))?;

    if let Some(path) = params.save {
        let json = serde_json::to_string_pretty(&stats)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
        eprintln!("Saved stats to {}", path.display());
    }

    if params.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    emit_receipt(&stats, printed_at, params.out)
}

async fn fetch(
    params: &FetchParams<'_>,
    config: ClientConfig,
    cancel: CancellationToken,
) -> Result<DeveloperActivityStats> {
    if params.once {
        let transport = HttpTransport::new(config)?;
        return tokio::select! {
            _ = cancel.cancelled() => bail!("cancelled"),
            result = transport.fetch_stats_once(params.username) => Ok(result?),
        };
    }

    let observer = Arc::new(CliObserver::new(params.quiet));
    let mut client = JobClient::from_config(config)?;
    let job = client.submit(params.username, observer.clone())?;

    let state = tokio::select! {
        _ = cancel.cancelled() => {
            client.cancel();
            job.settled().await;
            bail!("cancelled");
        }
        state = job.wait() => state,
    };
    job.settled().await;

    match state {
        JobState::Completed => observer
            .take_stats()
            .ok_or_else(|| anyhow!("job completed without a result")),
        JobState::Failed => Err(observer
            .take_error()
            .map_or_else(|| anyhow!("job failed"), anyhow::Error::from)),
        other => bail!("job ended in state {other}"),
    }
}

/// Progress to stderr, outcome kept for the caller.
struct CliObserver {
    quiet: bool,
    stats: Mutex<Option<DeveloperActivityStats>>,
    error: Mutex<Option<ReceiptError>>,
}

impl CliObserver {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            stats: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    fn take_stats(&self) -> Option<DeveloperActivityStats> {
        self.stats.lock().ok()?.take()
    }

    fn take_error(&self) -> Option<ReceiptError> {
        self.error.lock().ok()?.take()
    }
}

impl JobObserver for CliObserver {
    fn on_status_update(&self, event: &StatusEvent) {
        if !self.quiet {
            eprintln!("[{:>3}%] {}", event.progress, event.message);
        }
    }

    fn on_complete(&self, stats: DeveloperActivityStats) {
        if let Ok(mut slot) = self.stats.lock() {
            *slot = Some(stats);
        }
    }

    fn on_error(&self, error: &ReceiptError) {
        if let Ok(mut slot) = self.error.lock() {
            *slot = Some(error.clone());
        }
    }
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}
