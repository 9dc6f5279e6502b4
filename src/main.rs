//! MINIQUERY CLI Entry Point
//!
//! `mini` runs one terse command line against the configured database:
//!
//! ```text
//! mini users id=5 +name
//! mini -- -vertical users /name
//! mini '\sq' select count(*) from users
//! mini '\table' users
//! ```
//!
//! Results go to stdout. Logs go to stderr, filtered by `MINI_LOG`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use miniquery::config::{load_settings, load_with_precedence};
use miniquery::options::BACKDOOR_ENV;
use miniquery::{assign_query_kind, DisplayMode, Session, SqliteEngine, TerminalWidth};

/// Environment variable holding the log filter
const LOG_ENV: &str = "MINI_LOG";

/// MINIQUERY - terse database queries
#[derive(Parser)]
#[command(name = "mini")]
#[command(about = "Query a database with terse token syntax instead of full SQL")]
#[command(version)]
struct Cli {
    /// Command tokens: table, predicates, +columns, /order, %group, -options.
    /// Put `--` first when the line starts with an option.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    tokens: Vec<String>,

    /// Active database (SQLite file)
    #[arg(long, env = "MINI_DB")]
    db: Option<String>,

    /// Active table
    #[arg(long)]
    table: Option<String>,

    /// Display format: tab, wrap, nowrap or vertical
    #[arg(long)]
    format: Option<DisplayMode>,

    /// Terminal width for the wrap layout (default: probe stdout)
    #[arg(long)]
    width: Option<usize>,

    /// Explicit-command leader
    #[arg(long)]
    leader: Option<String>,

    /// Settings file to use instead of the local/global files
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Print the classified query as JSON instead of running it
    #[arg(long)]
    explain: bool,

    /// Log pipeline decisions to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut settings = match &cli.settings {
        Some(path) => load_settings(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => load_with_precedence().context("loading settings")?,
    };

    // Command-line arguments beat both settings files
    if let Some(db) = cli.db {
        settings.database = Some(db);
    }
    if let Some(table) = cli.table {
        settings.table = Some(table);
    }
    if let Some(format) = cli.format {
        settings.format = format;
    }
    if let Some(leader) = cli.leader {
        settings.leader = leader;
    }

    let width = cli.width.map_or_else(TerminalWidth::probe, TerminalWidth::Columns);
    let engine = SqliteEngine::from_settings(&settings)?;
    let mut session = Session::new(settings, engine).with_width(width);

    let backdoor = std::env::var(BACKDOOR_ENV).ok();
    session.seed_options(backdoor.as_deref())?;

    if cli.explain {
        let mut query = session.classify(&cli.tokens);
        if query.is_query_command {
            assign_query_kind(&mut query)?;
        }
        println!("{}", serde_json::to_string_pretty(&query)?);
        return Ok(());
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = session.dispatch(&cli.tokens, &mut out).await?;
    tracing::debug!(?outcome, "command finished");

    Ok(())
}
