//! Status events exchanged over the job stream.
//!
//! Each frame is one JSON object:
//! `{"type": "api_call", "message": "...", "progress": 30, "data": {}, "timestamp": "..."}`.
//! Decoding rejects unknown kinds, out-of-range progress and unparseable
//! timestamps. Everything else is passed through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::{ReceiptError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    ApiCall,
    Processing,
    Complete,
    Data,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Start,
        EventKind::ApiCall,
        EventKind::Processing,
        EventKind::Complete,
        EventKind::Data,
        EventKind::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::ApiCall => "api_call",
            EventKind::Processing => "processing",
            EventKind::Complete => "complete",
            EventKind::Data => "data",
            EventKind::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == raw)
    }

    /// `data` ends a job successfully, `error` ends it with a failure.
    /// `complete` is only a progress milestone.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Data | EventKind::Error)
    }
}

/// One decoded stream event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub progress: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Raw result payload. Only populated on `data` events.
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    progress: Option<Value>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode one frame into a [`StatusEvent`].
pub fn decode_event(frame: &str) -> Result<StatusEvent> {
    let raw: RawEvent = serde_json::from_str(frame.trim())
        .map_err(|e| ReceiptError::DataFormat(format!("malformed event frame: {e}")))?;

    let kind = EventKind::parse(&raw.kind)
        .ok_or_else(|| ReceiptError::DataFormat(format!("unknown event type `{}`", raw.kind)))?;
    let progress = decode_progress(raw.progress.as_ref())?;
    let timestamp = match raw.timestamp.as_deref() {
        Some(ts) => parse_timestamp(ts)?,
        None => return Err(ReceiptError::missing_field("timestamp")),
    };
    let payload = raw.data.filter(|v| !is_empty_payload(v));

    Ok(StatusEvent {
        kind,
        message: raw.message.unwrap_or_default(),
        progress,
        timestamp,
        payload,
    })
}

/// Progress must be a number in `0..=100`. Fractional values are truncated.
fn decode_progress(raw: Option<&Value>) -> Result<u8> {
    let value = raw.ok_or_else(|| ReceiptError::missing_field("progress"))?;
    let out_of_range = || ReceiptError::DataFormat(format!("progress {value} outside 0..=100"));

    let number = match value {
        Value::Number(n) => n,
        _ => return Err(ReceiptError::invalid_field("progress", "a number")),
    };
    if let Some(p) = number.as_u64() {
        return u8::try_from(p)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(out_of_range);
    }
    match number.as_f64() {
        Some(p) if p.is_finite() && (0.0..=100.0).contains(&p) => Ok(p.trunc() as u8),
        _ => Err(out_of_range()),
    }
}

/// Accepts RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fraction]` read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    parse_naive_timestamp(raw)
        .ok_or_else(|| ReceiptError::DataFormat(format!("unparseable timestamp `{raw}`")))
}

fn parse_naive_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let (main, fraction) = match raw.split_once('.') {
        Some((main, fraction)) => (main, Some(fraction)),
        None => (raw, None),
    };
    let mut dt = PrimitiveDateTime::parse(
        main,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()?;

    if let Some(fraction) = fraction {
        if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let nanos: u32 = format!("{fraction:0<9}").parse().ok()?;
        dt = dt.replace_nanosecond(nanos).ok()?;
    }
    Some(dt.assume_utc())
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn frame(kind: &str, progress: &str, ts: &str) -> String {
        format!(
            r#"{{"type":"{kind}","message":"m","progress":{progress},"data":{{}},"timestamp":"{ts}"}}"#
        )
    }

    #[test]
    fn decodes_every_known_kind() {
        for kind in EventKind::ALL {
            let ev = decode_event(&frame(kind.as_str(), "10", "2024-01-03T00:00:00Z")).unwrap();
            assert_eq!(ev.kind, kind);
            assert_eq!(ev.progress, 10);
            assert!(ev.payload.is_none(), "empty object payload is dropped");
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = decode_event(&frame("progress", "10", "2024-01-03T00:00:00Z")).unwrap_err();
        assert!(matches!(err, ReceiptError::DataFormat(ref m) if m.contains("progress")));
    }

    #[test]
    fn rejects_out_of_range_progress() {
        for bad in ["101", "-1", "100.5", "\"50\"", "null"] {
            let err = decode_event(&frame("api_call", bad, "2024-01-03T00:00:00Z")).unwrap_err();
            assert!(matches!(err, ReceiptError::DataFormat(_)), "progress {bad}");
        }
    }

    #[test]
    fn fractional_progress_is_truncated() {
        let ev = decode_event(&frame("api_call", "66.666", "2024-01-03T00:00:00Z")).unwrap();
        assert_eq!(ev.progress, 66);
        let ev = decode_event(&frame("complete", "100", "2024-01-03T00:00:00Z")).unwrap();
        assert_eq!(ev.progress, 100);
    }

    #[test]
    fn rejects_bad_or_missing_timestamp() {
        let err = decode_event(&frame("start", "0", "yesterday")).unwrap_err();
        assert!(matches!(err, ReceiptError::DataFormat(ref m) if m.contains("yesterday")));

        let err = decode_event(r#"{"type":"start","progress":0}"#).unwrap_err();
        assert!(matches!(err, ReceiptError::DataFormat(ref m) if m.contains("timestamp")));
    }

    #[test]
    fn accepts_naive_isoformat_timestamps() {
        let ev = decode_event(&frame("start", "0", "2024-01-03T10:20:30.123456")).unwrap();
        assert_eq!(ev.timestamp, datetime!(2024-01-03 10:20:30.123456 UTC));

        let ev = decode_event(&frame("start", "0", "2024-01-03T10:20:30")).unwrap();
        assert_eq!(ev.timestamp, datetime!(2024-01-03 10:20:30 UTC));

        let ev = decode_event(&frame("start", "0", "2024-01-03T10:20:30+09:00")).unwrap();
        assert_eq!(ev.timestamp, datetime!(2024-01-03 01:20:30 UTC));
    }

    #[test]
    fn data_event_keeps_payload_and_message() {
        let raw = r#"{"type":"data","message":"done","progress":100,
            "data":{"login":"octocat"},"timestamp":"2024-01-03T00:00:00Z"}"#;
        let ev = decode_event(raw).unwrap();
        assert_eq!(ev.kind, EventKind::Data);
        assert!(ev.kind.is_terminal());
        assert_eq!(ev.message, "done");
        assert_eq!(ev.payload.unwrap()["login"], "octocat");
    }

    #[test]
    fn missing_message_defaults_to_empty() {
        let ev = decode_event(r#"{"type":"processing","progress":90,"timestamp":"2024-01-03T00:00:00Z"}"#)
            .unwrap();
        assert_eq!(ev.message, "");
        assert!(!ev.kind.is_terminal());
    }

    #[test]
    fn rejects_non_json_frame() {
        assert!(matches!(
            decode_event("not json"),
            Err(ReceiptError::DataFormat(_))
        ));
    }
}
