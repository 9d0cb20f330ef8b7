//! Contribution calendar: reshapes per-day commit samples into the weekly
//! heatmap geometry (Sunday-first columns, newest week last) plus the month
//! labels drawn above it.
//!
//! Everything here is a pure function of its inputs. The reference instant is
//! passed in; "today" is the calendar date of that instant in its own offset.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::stats::{iso_date, CommitSample, DeveloperActivityStats};

/// Lookback window of the grid, in days.
pub const LOOKBACK_DAYS: i64 = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCell {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub count: u32,
    pub level: u8,
}

/// Seven cells, Sunday first. Only the trailing week may be shorter.
pub type Week = Vec<DayCell>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContributionGrid {
    pub weeks: Vec<Week>,
}

impl ContributionGrid {
    pub fn cells(&self) -> impl Iterator<Item = &DayCell> {
        self.weeks.iter().flatten()
    }

    pub fn cell(&self, date: Date) -> Option<&DayCell> {
        self.cells().find(|c| c.date == date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthLabel {
    /// Two-digit month token, e.g. `"07"`.
    pub label: String,
    pub week_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarView {
    pub grid: ContributionGrid,
    pub month_labels: Vec<MonthLabel>,
}

// ── Levels ──

/// Heatmap intensity bucket: `0`, `1–2`, `3–5`, `6–10`, `>10`.
pub fn contribution_level(count: u32) -> u8 {
    match count {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        6..=10 => 3,
        _ => 4,
    }
}

// ── Grid ──

/// Build the grid covering the lookback window that ends at `now`.
///
/// Sample dates are UTC calendar dates, so "today" is the UTC date of `now`
/// whatever its offset. Duplicate dates resolve last-write-wins. Days without
/// a sample count 0.
pub fn build_grid(samples: &[CommitSample], now: OffsetDateTime) -> ContributionGrid {
    let counts: HashMap<Date, u32> = samples.iter().map(|s| (s.date, s.count)).collect();

    let now = now.to_offset(UtcOffset::UTC);
    let today = now.date();
    let window_start = (now - Duration::days(LOOKBACK_DAYS)).date();
    let first_sunday =
        window_start - Duration::days(i64::from(window_start.weekday().number_days_from_sunday()));
    let total_days = (today - first_sunday).whole_days() + 1;

    let cells: Vec<DayCell> = (0..total_days)
        .map(|offset| {
            let date = first_sunday + Duration::days(offset);
            let count = counts.get(&date).copied().unwrap_or(0);
            DayCell {
                date,
                count,
                level: contribution_level(count),
            }
        })
        .collect();

    ContributionGrid {
        weeks: cells.chunks(7).map(<[DayCell]>::to_vec).collect(),
    }
}

/// One label per month whose first week starts within the grid. The first
/// occurrence of a month token wins.
pub fn month_labels(grid: &ContributionGrid) -> Vec<MonthLabel> {
    let mut labels: Vec<MonthLabel> = Vec::new();
    for (week_index, week) in grid.weeks.iter().enumerate() {
        let Some(first) = week.first() else {
            continue;
        };
        if first.date.day() > 7 {
            continue;
        }
        let label = format!("{:02}", u8::from(first.date.month()));
        if labels.iter().any(|l| l.label == label) {
            continue;
        }
        labels.push(MonthLabel { label, week_index });
    }
    labels
}

pub fn build_calendar(samples: &[CommitSample], now: OffsetDateTime) -> CalendarView {
    let grid = build_grid(samples, now);
    let month_labels = month_labels(&grid);
    CalendarView { grid, month_labels }
}

/// Calendar for a completed job. Summary figures on `stats` are left alone.
pub fn aggregate(stats: &DeveloperActivityStats, now: OffsetDateTime) -> CalendarView {
    build_calendar(&stats.daily_commits, now)
}

// ── Fallback summary ──

/// Summary figures derived from raw samples, used when the backend did not
/// supply them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub total_commits: u64,
    pub active_days: u32,
    pub max_streak: u32,
    pub best_day: Option<CommitSample>,
}

/// Summarise the full sample list. Best day is the highest count, earliest
/// date on ties; the streak counts consecutive calendar days with commits.
pub fn summarize(samples: &[CommitSample]) -> ActivitySummary {
    let by_date: BTreeMap<Date, u32> = samples.iter().map(|s| (s.date, s.count)).collect();

    let mut summary = ActivitySummary::default();
    let mut streak = 0u32;
    let mut prev_active: Option<Date> = None;

    for (&date, &count) in &by_date {
        summary.total_commits += u64::from(count);

        if summary.best_day.map_or(true, |best| count > best.count) {
            summary.best_day = Some(CommitSample::new(date, count));
        }

        if count == 0 {
            streak = 0;
            prev_active = None;
            continue;
        }
        summary.active_days += 1;
        streak = match prev_active {
            Some(prev) if prev.next_day() == Some(date) => streak + 1,
            _ => 1,
        };
        prev_active = Some(date);
        summary.max_streak = summary.max_streak.max(streak);
    }
    summary
}
