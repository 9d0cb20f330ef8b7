use receipt_core::calendar::{aggregate, CalendarView};
use receipt_core::DeveloperActivityStats;
use time::OffsetDateTime;

const WIDTH: usize = 40;
const NAME_WIDTH: usize = 20;
const LANGUAGE_WIDTH: usize = 10;
/// Indexed by contribution level.
pub const LEVEL_GLYPHS: [char; 5] = ['·', '░', '▒', '▓', '█'];
const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const ROW_LABEL_WIDTH: usize = 4;

/// Plain-text receipt for one user, printed at `now`.
pub fn render_receipt(stats: &DeveloperActivityStats, now: OffsetDateTime) -> String {
    let mut out = Vec::new();
    let heavy = "=".repeat(WIDTH);
    let light = "-".repeat(WIDTH);

    // ── Header ──
    out.push(heavy.clone());
    out.push(center("GITHUB ACTIVITY RECEIPT"));
    out.push(center(&print_time(now)));
    out.push(heavy.clone());

    // ── Identity ──
    out.push(stats.display_name.clone());
    out.push(format!("@{}", stats.username));
    out.push(columns(
        &format!("Public repos: {}", thousands(stats.public_repos.into())),
        &format!("Followers: {}", thousands(stats.followers.into())),
    ));
    out.push(light.clone());

    // ── Stats ──
    out.push(columns("TOTAL COMMITS", &thousands(stats.total_commits)));
    out.push(columns("ACTIVE DAYS", &thousands(stats.active_days.into())));
    out.push(columns("MAX STREAK", &format!("{} days", thousands(stats.max_streak.into()))));
    let best = stats.best_day.map_or_else(
        || "-".to_string(),
        |day| {
            format!(
                "{} ({:04}{:02}{:02})",
                thousands(day.count.into()),
                day.date.year(),
                u8::from(day.date.month()),
                day.date.day()
            )
        },
    );
    out.push(columns("BEST DAY", &best));
    out.push(light.clone());

    // ── Top repositories ──
    out.push("TOP REPOSITORIES".to_string());
    if stats.top_repositories.is_empty() {
        out.push("  No public repositories.".to_string());
    }
    for repo in stats.top_repositories.iter().take(10).rev() {
        let language = match repo.primary_language.as_deref() {
            Some(lang) if !lang.is_empty() => lang,
            _ => "N/A",
        };
        out.push(format!(
            " {:<name_w$} {:<lang_w$} {:>6}",
            truncate(&repo.name, NAME_WIDTH),
            truncate(language, LANGUAGE_WIDTH),
            thousands(repo.stars.into()),
            name_w = NAME_WIDTH,
            lang_w = LANGUAGE_WIDTH,
        ));
    }
    out.push(light);

    // ── Contribution grid ──
    out.push("CONTRIBUTIONS (last 180 days)".to_string());
    out.extend(grid_lines(&aggregate(stats, now)));

    // ── Footer ──
    out.push(heavy.clone());
    out.push(center("THANK YOU!"));
    out.push(center(concat!("receipt v", env!("CARGO_PKG_VERSION"))));
    out.push(heavy);

    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Month label row, one row per weekday, then the legend.
pub fn grid_lines(view: &CalendarView) -> Vec<String> {
    let weeks = &view.grid.weeks;
    let mut lines = Vec::with_capacity(9);

    let mut labels: Vec<char> = vec![' '; ROW_LABEL_WIDTH + weeks.len() + 2];
    for label in &view.month_labels {
        let start = ROW_LABEL_WIDTH + label.week_index;
        for (offset, ch) in label.label.chars().enumerate() {
            if let Some(slot) = labels.get_mut(start + offset) {
                *slot = ch;
            }
        }
    }
    lines.push(labels.into_iter().collect::<String>().trim_end().to_string());

    for (day, name) in WEEKDAYS.iter().enumerate() {
        let mut row = format!("{name:<width$}", width = ROW_LABEL_WIDTH);
        for week in weeks {
            row.push(
                week.get(day)
                    .map_or(' ', |cell| LEVEL_GLYPHS[usize::from(cell.level.min(4))]),
            );
        }
        lines.push(row.trim_end().to_string());
    }

    let ramp: Vec<String> = LEVEL_GLYPHS.iter().map(char::to_string).collect();
    lines.push(format!("less {} more", ramp.join(" ")));
    lines
}

fn print_time(now: OffsetDateTime) -> String {
    let offset = now.offset();
    let zone = if offset.is_utc() {
        "UTC".to_string()
    } else {
        let (h, m, _) = offset.as_hms();
        let sign = if offset.is_negative() { '-' } else { '+' };
        format!("{sign}{:02}:{:02}", h.unsigned_abs(), m.unsigned_abs())
    };
    format!(
        "{:04}/{:02}/{:02} {:02}:{:02} {zone}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute()
    )
}

fn center(text: &str) -> String {
    let len = text.chars().count();
    if len >= WIDTH {
        return text.to_string();
    }
    format!("{}{text}", " ".repeat((WIDTH - len) / 2))
}

fn columns(left: &str, right: &str) -> String {
    let used = left.chars().count() + right.chars().count();
    let gap = WIDTH.saturating_sub(used).max(1);
    format!("{left}{}{right}", " ".repeat(gap))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max - 1).collect();
    cut.push('…');
    cut
}

/// `1234567` → `1,234,567`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
