//! `certify`: command-line front end for the certification survey store.
//!
//! Reads `certify.toml` (or the path given with `--config`) and environment
//! variables prefixed `CERTIFY_`, opens the SQLite store and runs one
//! subcommand.
//!
//! # Usage
//!
//! ```text
//! certify import survey-1.0.2.json
//! certify answer alice answers.json
//! certify submit alice --spec-version 1.0.2
//! certify submissions
//! ```

mod commands;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use certify_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use commands::{StatusChange, Target};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(author, version, about = "Self-certification survey store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "certify.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Import a survey definition from a JSON file. A version that already
  /// exists is revised in place; questions can be added but never removed.
  Import { file: PathBuf },
  /// List the stored spec versions, oldest first.
  Versions,
  /// Show a user's answers, completion and score.
  Show(Target),
  /// Record answers from a JSON list of `{number, value, evidence}`.
  Answer {
    #[command(flatten)]
    target:  Target,
    file:    PathBuf,
    /// Make the file the complete answer set, deleting anything it omits.
    #[arg(long)]
    replace: bool,
  },
  /// Submit a response for certification.
  Submit(Target),
  /// Reopen a submitted response.
  Unsubmit(Target),
  Approve(Target),
  Reject(Target),
  /// Delete every answer and clear the status flags.
  Reset(Target),
  /// Print every response's submission status as JSON lines.
  Submissions,
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
}

fn default_store_path() -> PathBuf { PathBuf::from("certify.db") }

fn load_config(path: &Path) -> anyhow::Result<CliConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("CERTIFY"))
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise CliConfig")
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = load_config(&cli.config)?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Import { file } => commands::import(&store, &file).await,
    Command::Versions => commands::versions(&store).await,
    Command::Show(target) => commands::show(&store, target).await,
    Command::Answer {
      target,
      file,
      replace,
    } => commands::answer(&store, target, &file, replace).await,
    Command::Submit(target) => {
      commands::change_status(&store, target, StatusChange::Submit).await
    }
    Command::Unsubmit(target) => {
      commands::change_status(&store, target, StatusChange::Unsubmit).await
    }
    Command::Approve(target) => {
      commands::change_status(&store, target, StatusChange::Approve).await
    }
    Command::Reject(target) => {
      commands::change_status(&store, target, StatusChange::Reject).await
    }
    Command::Reset(target) => commands::reset(&store, target).await,
    Command::Submissions => commands::submissions(&store).await,
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
