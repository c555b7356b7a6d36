//! dashsync: keep Grafana dashboards and a git repository in step.
//!
//! # Usage
//!
//! ```text
//! dashsync sync [--config configuration.yml] [--dry-run] [--show-diff]
//! dashsync validate [--config configuration.yml]
//! dashsync --log-as-json <command>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{sync::SyncArgs, validate::ValidateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dashsync",
    version,
    about = "Synchronize Grafana dashboards with a git repository",
    long_about = None,
)]
struct Cli {
    /// Emit log records as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_as_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every configured job: push tagged dashboards, then pull the branch.
    Sync(SyncArgs),

    /// Check the configuration file without contacting any server.
    Validate(ValidateArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_as_json);
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::Validate(args) => args.run(),
    }
}

/// Logs go to stderr so stdout stays reserved for the run summary.
fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
