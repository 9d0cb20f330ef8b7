use anyhow::{bail, Context, Result};
use receipt_core::calendar::aggregate;
use receipt_core::reconstruct::reconstruct;
use receipt_core::DeveloperActivityStats;
use serde_json::Value;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::export::export_receipt;
use crate::render::render_receipt;

/// Execute `receipt render <stats.json>`
pub fn render(stats_file: &Path, now: Option<&str>, out: Option<&Path>) -> Result<()> {
    let stats = load_stats(stats_file)?;
    emit_receipt(&stats, parse_now(now)?, out)
}

/// Execute `receipt calendar <stats.json>`
pub fn calendar(stats_file: &Path, now: Option<&str>) -> Result<()> {
    let stats = load_stats(stats_file)?;
    let view = aggregate(&stats, parse_now(now)?);
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Print the receipt, or export it when `out` is given.
pub fn emit_receipt(stats: &DeveloperActivityStats, now: OffsetDateTime, out: Option<&Path>) -> Result<()> {
    let receipt = render_receipt(stats, now);
    match out {
        None => print!("{receipt}"),
        Some(path) => {
            let outcome = export_receipt(&receipt, path);
            eprintln!("{outcome}");
            if !outcome.is_saved() {
                bail!("export failed");
            }
        }
    }
    Ok(())
}

/// Accepts saved canonical stats, a raw backend payload, or a whole `data`
/// event frame.
pub fn load_stats(path: &Path) -> Result<DeveloperActivityStats> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    stats_from_value(value).with_context(|| format!("cannot load stats from {}", path.display()))
}

fn stats_from_value(value: Value) -> Result<DeveloperActivityStats> {
    let value = match value {
        Value::Object(mut frame) if frame.get("type").and_then(Value::as_str) == Some("data") => {
            frame.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    match serde_json::from_value::<DeveloperActivityStats>(value.clone()) {
        Ok(stats) => Ok(stats),
        Err(_) => Ok(reconstruct(&value)?),
    }
}

/// Current time in the local offset, or UTC when the offset is unknown.
///
/// The local offset can only be read while the process is single-threaded,
/// so call this before spawning threads.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn parse_now(now: Option<&str>) -> Result<OffsetDateTime> {
    match now {
        None => Ok(local_now()),
        Some(raw) => OffsetDateTime::parse(raw.trim(), &Rfc3339)
            .with_context(|| format!("--now must be an RFC 3339 timestamp, got `{raw}`")),
    }
}
