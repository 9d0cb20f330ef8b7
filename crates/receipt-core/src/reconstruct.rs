//! Result reconstruction: raw `data` payload → [`DeveloperActivityStats`].
//!
//! The payload is first validated into a [`RawPayload`] (every field checked,
//! errors name the offending path), and only then converted. Nothing is
//! produced unless the whole payload validates.
//!
//! Two payload shapes are understood:
//! - streamed: the `data` event body, GraphQL-style keys (`login`,
//!   `avatarUrl`, `followers.totalCount`, `daily_commits_data`, ...)
//! - flat: the one-shot stats response (`username`, `avatar_url`,
//!   `followers`, `daily_commits`, ...)

use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::debug;

use crate::calendar::summarize;
use crate::error::{ReceiptError, Result};
use crate::event::{parse_timestamp, StatusEvent};
use crate::stats::{
    parse_date, CommitSample, DeveloperActivityStats, TopRepository, TOP_REPOSITORY_LIMIT,
};

/// Build the canonical stats from a raw payload.
pub fn reconstruct(payload: &Value) -> Result<DeveloperActivityStats> {
    Ok(RawPayload::parse(payload)?.into_stats())
}

/// Build the canonical stats from a terminal `data` event.
pub fn reconstruct_event(event: &StatusEvent) -> Result<DeveloperActivityStats> {
    let payload = event
        .payload
        .as_ref()
        .ok_or_else(|| ReceiptError::DataFormat("data event carried no payload".into()))?;
    reconstruct(payload)
}

// ── Shapes ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Streamed,
    Flat,
}

#[derive(Clone, Copy)]
enum CountKey {
    Flat(&'static str),
    Nested(&'static str, &'static str),
}

struct ShapeKeys {
    username: &'static str,
    avatar_url: &'static str,
    created_at: &'static str,
    public_repos: CountKey,
    followers: CountKey,
    following: CountKey,
    total_commits: &'static str,
    daily_commits: &'static str,
}

static STREAMED_KEYS: ShapeKeys = ShapeKeys {
    username: "login",
    avatar_url: "avatarUrl",
    created_at: "createdAt",
    public_repos: CountKey::Nested("repositories", "totalCount"),
    followers: CountKey::Nested("followers", "totalCount"),
    following: CountKey::Nested("following", "totalCount"),
    total_commits: "total_contributions",
    daily_commits: "daily_commits_data",
};

static FLAT_KEYS: ShapeKeys = ShapeKeys {
    username: "username",
    avatar_url: "avatar_url",
    created_at: "created_at",
    public_repos: CountKey::Flat("public_repos"),
    followers: CountKey::Flat("followers"),
    following: CountKey::Flat("following"),
    total_commits: "total_commits",
    daily_commits: "daily_commits",
};

impl PayloadShape {
    fn detect(fields: &Fields<'_>) -> Result<Self> {
        if fields.has(STREAMED_KEYS.username) {
            Ok(PayloadShape::Streamed)
        } else if fields.has(FLAT_KEYS.username) {
            Ok(PayloadShape::Flat)
        } else {
            Err(ReceiptError::missing_field(STREAMED_KEYS.username))
        }
    }

    fn keys(self) -> &'static ShapeKeys {
        match self {
            PayloadShape::Streamed => &STREAMED_KEYS,
            PayloadShape::Flat => &FLAT_KEYS,
        }
    }
}

// ── Validated intermediate ──

/// What the backend said about the best day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedBestDay {
    /// Field absent: derive it from the samples.
    Unreported,
    /// Reported with an empty date: there is no best day.
    NoActivity,
    Day(CommitSample),
}

/// A payload that passed validation. Absent summary fields stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub shape: PayloadShape,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: String,
    pub created_at: OffsetDateTime,
    pub public_repos: u32,
    pub followers: u32,
    pub following: u32,
    pub total_commits: u64,
    pub daily_commits: Vec<CommitSample>,
    pub active_days: Option<u32>,
    pub max_streak: Option<u32>,
    pub best_day: ReportedBestDay,
    pub top_repositories: Vec<TopRepository>,
}

impl RawPayload {
    pub fn parse(payload: &Value) -> Result<Self> {
        let fields = Fields::root(payload)?;
        let shape = PayloadShape::detect(&fields)?;
        let keys = shape.keys();

        Ok(RawPayload {
            shape,
            username: fields.required_str(keys.username)?,
            display_name: fields.optional_str("name")?,
            avatar_url: fields.required_str(keys.avatar_url)?,
            created_at: fields.required_instant(keys.created_at)?,
            public_repos: fields.count_at(keys.public_repos)?.unwrap_or(0),
            followers: fields.count_at(keys.followers)?.unwrap_or(0),
            following: fields.count_at(keys.following)?.unwrap_or(0),
            total_commits: fields.count(keys.total_commits)?.unwrap_or(0),
            daily_commits: parse_samples(&fields, keys.daily_commits)?,
            active_days: fields.count_u32("active_days")?,
            max_streak: fields.count_u32("max_streak")?,
            best_day: parse_best_day(&fields)?,
            top_repositories: parse_repositories(&fields)?,
        })
    }

    pub fn into_stats(self) -> DeveloperActivityStats {
        let needs_summary = self.active_days.is_none()
            || self.max_streak.is_none()
            || self.best_day == ReportedBestDay::Unreported;
        let summary = if needs_summary {
            debug!(
                samples = self.daily_commits.len(),
                "summary fields missing from payload, deriving from samples"
            );
            summarize(&self.daily_commits)
        } else {
            Default::default()
        };

        let best_day = match self.best_day {
            ReportedBestDay::Unreported => summary.best_day,
            ReportedBestDay::NoActivity => None,
            ReportedBestDay::Day(day) => Some(day),
        };
        let display_name = self
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.username.clone());

        DeveloperActivityStats {
            username: self.username,
            display_name,
            avatar_url: self.avatar_url,
            created_at: self.created_at,
            public_repos: self.public_repos,
            followers: self.followers,
            following: self.following,
            total_commits: self.total_commits,
            active_days: self.active_days.unwrap_or(summary.active_days),
            max_streak: self.max_streak.unwrap_or(summary.max_streak),
            best_day,
            top_repositories: self.top_repositories,
            daily_commits: self.daily_commits,
        }
    }
}

fn parse_samples(fields: &Fields<'_>, key: &str) -> Result<Vec<CommitSample>> {
    let items = fields
        .array(key)?
        .ok_or_else(|| ReceiptError::missing_field(&fields.path(key)))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let entry = fields.element(key, i, item)?;
            let count = entry
                .count_u32("count")?
                .ok_or_else(|| ReceiptError::missing_field(&entry.path("count")))?;
            Ok(CommitSample::new(entry.required_date("date")?, count))
        })
        .collect()
}

fn parse_best_day(fields: &Fields<'_>) -> Result<ReportedBestDay> {
    let Some(entry) = fields.object("best_day")? else {
        return Ok(ReportedBestDay::Unreported);
    };
    if entry.required_str("date")?.trim().is_empty() {
        return Ok(ReportedBestDay::NoActivity);
    }
    Ok(ReportedBestDay::Day(CommitSample::new(
        entry.required_date("date")?,
        entry.count_u32("count")?.unwrap_or(0),
    )))
}

/// Keeps the first entries in backend order.
fn parse_repositories(fields: &Fields<'_>) -> Result<Vec<TopRepository>> {
    let key = "top_repositories";
    let Some(items) = fields.array(key)? else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .take(TOP_REPOSITORY_LIMIT)
        .enumerate()
        .map(|(i, item)| {
            let repo = fields.element(key, i, item)?;
            Ok(TopRepository {
                name: repo.required_str("name")?,
                stars: repo.count_u32("stargazers_count")?.unwrap_or(0),
                primary_language: repo.optional_str("primary_language")?,
                updated_at: repo.required_instant("updated_at")?,
            })
        })
        .collect()
}

// ── Field access ──

/// A JSON object plus the path it was reached by, for error messages.
/// `null` is treated the same as an absent key.
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    prefix: String,
}

impl<'a> Fields<'a> {
    fn root(value: &'a Value) -> Result<Self> {
        match value {
            Value::Object(obj) => Ok(Fields {
                obj,
                prefix: String::new(),
            }),
            _ => Err(ReceiptError::DataFormat(
                "payload must be a JSON object".into(),
            )),
        }
    }

    fn path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.prefix)
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn required_str(&self, key: &str) -> Result<String> {
        self.optional_str(key)?
            .ok_or_else(|| ReceiptError::missing_field(&self.path(key)))
    }

    fn optional_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ReceiptError::invalid_field(&self.path(key), "a string")),
        }
    }

    fn required_date(&self, key: &str) -> Result<time::Date> {
        let raw = self.required_str(key)?;
        parse_date(&raw)
            .ok_or_else(|| ReceiptError::invalid_field(&self.path(key), "a YYYY-MM-DD date"))
    }

    fn required_instant(&self, key: &str) -> Result<OffsetDateTime> {
        let raw = self.required_str(key)?;
        parse_timestamp(&raw)
            .map_err(|_| ReceiptError::invalid_field(&self.path(key), "an RFC 3339 timestamp"))
    }

    fn count(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                ReceiptError::invalid_field(&self.path(key), "a non-negative integer")
            }),
        }
    }

    fn count_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.count(key)? {
            None => Ok(None),
            Some(n) => u32::try_from(n)
                .map(Some)
                .map_err(|_| ReceiptError::invalid_field(&self.path(key), "a 32-bit count")),
        }
    }

    fn count_at(&self, key: CountKey) -> Result<Option<u32>> {
        match key {
            CountKey::Flat(k) => self.count_u32(k),
            CountKey::Nested(outer, inner) => match self.object(outer)? {
                Some(nested) => nested.count_u32(inner),
                None => Ok(None),
            },
        }
    }

    fn object(&self, key: &str) -> Result<Option<Fields<'a>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(obj)) => Ok(Some(Fields {
                obj,
                prefix: self.path(key),
            })),
            Some(_) => Err(ReceiptError::invalid_field(&self.path(key), "an object")),
        }
    }

    fn array(&self, key: &str) -> Result<Option<&'a Vec<Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(_) => Err(ReceiptError::invalid_field(&self.path(key), "an array")),
        }
    }

    fn element(&self, key: &str, index: usize, item: &'a Value) -> Result<Fields<'a>> {
        let prefix = format!("{}[{index}]", self.path(key));
        match item {
            Value::Object(obj) => Ok(Fields { obj, prefix }),
            _ => Err(ReceiptError::invalid_field(&prefix, "an object")),
        }
    }
}
