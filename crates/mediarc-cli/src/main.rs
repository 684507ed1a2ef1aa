mod commands;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use mediarc_core::{ArchiveConfig, CancellationToken, LayoutStrategy};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mediarc", version, about = "Index, check and import files into a media archive")]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import files into the quarantine, the archive or a custom directory
    Import(ImportArgs),
    /// Shift file datetimes, or restore them from the index
    Datetime(DatetimeArgs),
    /// Rename files to their index
    Setindex(SetIndexArgs),
    /// Check that every file below DIR is correctly indexed
    Check(CheckArgs),
}

#[derive(Args)]
#[command(group(ArgGroup::new("target").required(true).args(["quarantine", "database", "path"])))]
struct ImportArgs {
    /// Copy into the quarantine root, or into SUBPATH below it
    #[arg(long, num_args = 0..=1, default_missing_value = ".", value_name = "SUBPATH")]
    quarantine: Option<PathBuf>,

    /// Check the quarantine, then import all of it into the archive
    #[arg(long)]
    database: bool,

    /// Copy into a custom directory
    #[arg(long, value_name = "DIR")]
    path: Option<PathBuf>,

    /// Media type of the imported files
    #[arg(short = 't', long = "mediatype", value_name = "TYPE")]
    media_type: Option<String>,

    /// Index files while importing
    #[arg(short, long)]
    index: bool,

    /// Move instead of copy
    #[arg(long = "move")]
    move_files: bool,

    /// Treat PATHS as directories and import every file below them
    #[arg(short = 'd')]
    dirs: bool,

    /// Archive layout (database mode; overrides the config)
    #[arg(long, value_enum)]
    layout: Option<LayoutStrategy>,

    /// Repair quarantine issues before importing (database mode)
    #[arg(long)]
    fix: bool,

    paths: Vec<PathBuf>,
}

#[derive(Args)]
#[command(group(ArgGroup::new("mode").required(true).args(["add", "fix"])))]
struct DatetimeArgs {
    /// Add SECS (may be negative) to access and modification time
    #[arg(long, value_name = "SECS", allow_hyphen_values = true)]
    add: Option<i64>,

    /// Restore access and modification time from the index
    #[arg(long)]
    fix: bool,

    /// Treat PATHS as directories
    #[arg(short = 'd')]
    dirs: bool,

    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct SetIndexArgs {
    /// Re-index files that already have an index, keeping its date and media type
    #[arg(short, long)]
    update: bool,

    /// Media type of the files
    #[arg(short = 't', long = "mediatype", value_name = "TYPE")]
    media_type: Option<String>,

    /// Treat PATHS as directories
    #[arg(short = 'd')]
    dirs: bool,

    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct CheckArgs {
    dir: PathBuf,

    /// Repair what can be repaired
    #[arg(long)]
    fix: bool,

    /// Media type used when re-indexing
    #[arg(short = 't', long = "mediatype", value_name = "TYPE")]
    media_type: Option<String>,
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default = if verbose {
        "mediarc=debug,mediarc_core=debug"
    } else {
        "mediarc=info,mediarc_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file_layer = match log_file {
        Some(path) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => ArchiveConfig::load(path)?,
        None => ArchiveConfig::default(),
    };

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing current file...");
        handler_token.cancel();
    })
    .context("cannot install signal handler")?;

    let t_total = std::time::Instant::now();
    match cli.command {
        Command::Import(args) => commands::import(&config, args, &token)?,
        Command::Datetime(args) => commands::datetime(&config, args, &token)?,
        Command::Setindex(args) => commands::set_index(&config, args, &token)?,
        Command::Check(args) => commands::check(&config, args)?,
    }
    tracing::debug!(elapsed = t_total.elapsed().as_secs_f64(), "Done");

    Ok(())
}
