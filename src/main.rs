//! selfhost CLI entry point.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::ExitStatus;

/// selfhost - self-detecting executable containers
#[derive(Parser, Debug)]
#[command(name = "selfhost")]
#[command(about = "Append a compressed bundle to an executable and read it back")]
#[command(
    long_about = "selfhost appends a gzip-compressed directory tree to a host \
executable, producing a single file that can find, verify and extract its own \
payload.\n\n\
Quick start:\n  \
selfhost create --host ./backend --source ./bundle -o ./convex-selfhost\n  \
selfhost verify ./convex-selfhost\n  \
selfhost extract ./convex-selfhost -o ./data"
)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assemble a container from a host executable and a bundle directory
    Create(cli::create::CreateCmd),

    /// Report whether a file carries an embedded container
    Detect(cli::inspect::DetectCmd),

    /// Print the header of an embedded container
    Info(cli::inspect::InfoCmd),

    /// Check the payload against the checksum recorded in its header
    Verify(cli::verify::VerifyCmd),

    /// Extract the embedded payload into a directory
    Extract(cli::extract::ExtractCmd),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let status = if e.use_stderr() {
                ExitStatus::InvalidArguments
            } else {
                ExitStatus::Success
            };
            let _ = e.print();
            return status.into();
        }
    };

    init_logging(cli.verbose);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting selfhost");

    let result = match cli.command {
        Commands::Create(cmd) => cmd.run(),
        Commands::Detect(cmd) => cmd.run(),
        Commands::Info(cmd) => cmd.run(),
        Commands::Verify(cmd) => cmd.run(),
        Commands::Extract(cmd) => cmd.run(),
    };

    match result {
        Ok(status) => status.into(),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            e.status.into()
        }
    }
}

/// Initialize the tracing subscriber.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "selfhost=debug,selfhost_pack=debug"
    } else {
        "selfhost=warn,selfhost_pack=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
