use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Maximum number of repositories kept on a receipt.
pub const TOP_REPOSITORY_LIMIT: usize = 10;

/// Commit count observed on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSample {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub count: u32,
}

impl CommitSample {
    pub fn new(date: Date, count: u32) -> Self {
        Self { date, count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopRepository {
    pub name: String,
    pub stars: u32,
    /// `None` when the backend reports no primary language. An empty string
    /// is kept as-is.
    pub primary_language: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Canonical statistics for one completed job. Built once by the result
/// reconstructor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperActivityStats {
    pub username: String,
    pub display_name: String,
    pub avatar_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub public_repos: u32,
    pub followers: u32,
    pub following: u32,
    pub total_commits: u64,
    pub active_days: u32,
    pub max_streak: u32,
    #[serde(default)]
    pub best_day: Option<CommitSample>,
    #[serde(default)]
    pub top_repositories: Vec<TopRepository>,
    #[serde(default)]
    pub daily_commits: Vec<CommitSample>,
}

// ── Date helpers ──

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), format_description!("[year]-[month]-[day]")).ok()
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Serde adapter for `YYYY-MM-DD` dates.
pub mod iso_date {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).ok_or_else(|| D::Error::custom(format!("invalid date `{raw}`")))
    }
}
