mod cmd_fetch;
mod cmd_render;
mod export;
mod render;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "receipt", version, about = "Developer-activity receipts from GitHub stats")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch stats for a user, streaming progress to stderr
    Fetch {
        /// GitHub username
        username: String,
        /// Backend base URL (overrides RECEIPT_API_URL)
        #[arg(long)]
        api_url: Option<String>,
        /// Print the stats as JSON instead of a receipt
        #[arg(long)]
        json: bool,
        /// Write the receipt to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also save the stats as JSON, for `receipt render` later
        #[arg(long)]
        save: Option<PathBuf>,
        /// Use the one-shot endpoint instead of the event stream
        #[arg(long)]
        once: bool,
        /// Do not print progress lines
        #[arg(long, short)]
        quiet: bool,
    },
    /// Render a receipt from saved stats or a raw backend payload
    Render {
        /// Stats JSON file
        stats: PathBuf,
        /// Print time as RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,
        /// Write the receipt to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the contribution grid and month labels as JSON
    Calendar {
        /// Stats JSON file
        stats: PathBuf,
        /// Reference time as RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Fetch {
            username,
            api_url,
            json,
            out,
            save,
            once,
            quiet,
        } => cmd_fetch::execute(&cmd_fetch::FetchParams {
            username: &username,
            api_url: api_url.as_deref(),
            json,
            out: out.as_deref(),
            save: save.as_deref(),
            once,
            quiet,
        }),
        Command::Render { stats, now, out } => {
            cmd_render::render(&stats, now.as_deref(), out.as_deref())
        }
        Command::Calendar { stats, now } => cmd_render::calendar(&stats, now.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "receipt", "fetch", "octocat", "--json", "--api-url", "http://127.0.0.1:9000", "-q",
        ])
        .unwrap();
        match cli.cmd {
            Command::Fetch {
                username,
                api_url,
                json,
                quiet,
                once,
                ..
            } => {
                assert_eq!(username, "octocat");
                assert_eq!(api_url.as_deref(), Some("http://127.0.0.1:9000"));
                assert!(json && quiet && !once);
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn render_requires_stats_path() {
        assert!(Cli::try_parse_from(["receipt", "render"]).is_err());
        let cli = Cli::try_parse_from(["receipt", "calendar", "s.json", "--now", "2024-01-03T00:00:00Z"])
            .unwrap();
        assert!(matches!(cli.cmd, Command::Calendar { .. }));
    }
}
