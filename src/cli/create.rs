//! Create command for assembling containers.

use std::path::PathBuf;

use clap::Args;
use selfhost_pack::manifest::{self, MANIFEST_FILE};
use selfhost_pack::{Assembler, Compression, PackError, DEFAULT_REQUIRED_ENTRIES};
use tracing::info;

use super::{format_bytes, CommandResult, ExitStatus};

/// Assemble a self-detecting container.
///
/// The bundle directory must hold a `manifest.json`; its contents become the
/// header's metadata record.
///
/// Examples:
///   selfhost create --host ./convex-backend --source ./bundle -o ./convex-selfhost
///   selfhost create --host ./stub --source ./tree -o ./out --require manifest.json
#[derive(Args, Debug)]
pub struct CreateCmd {
    /// Host executable copied to the front of the container
    #[arg(long, value_name = "PATH")]
    pub host: PathBuf,

    /// Bundle directory to embed
    #[arg(long, value_name = "DIR")]
    pub source: PathBuf,

    /// Output file path for the container
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: PathBuf,

    /// Payload compression (gzip or zstd)
    #[arg(long, default_value_t = Compression::Gzip, value_name = "ALGO")]
    pub compression: Compression,

    /// Companion tool version recorded in the header
    #[arg(long, default_value = "", value_name = "VERSION")]
    pub ops_version: String,

    /// Entry that must exist in the bundle directory (repeatable)
    #[arg(long = "require", value_name = "NAME")]
    pub required: Vec<String>,
}

impl CreateCmd {
    pub fn run(self) -> CommandResult {
        let required: Vec<String> = if self.required.is_empty() {
            DEFAULT_REQUIRED_ENTRIES.iter().map(|s| s.to_string()).collect()
        } else {
            self.required
        };

        // Preconditions are checked with a placeholder record so a missing
        // bundle directory is reported before the manifest read fails.
        let assembler = Assembler::new(&self.host, &self.source)
            .with_compression(self.compression)
            .with_companion_version(self.ops_version)
            .with_required_entries(required)
            .with_metadata(serde_json::json!({}));
        assembler.check()?;

        let manifest_path = self.source.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(PackError::Validation(format!(
                "bundle is missing required file: {}",
                MANIFEST_FILE
            ))
            .into());
        }
        let metadata = manifest::read_record(&manifest_path)?;
        info!(source = %self.source.display(), "loaded bundle manifest");

        println!("Assembling {}...", self.output.display());
        let assembled = assembler.with_metadata(metadata).assemble(&self.output)?;

        println!(
            "Created {} ({})",
            assembled.output.display(),
            format_bytes(assembled.total_size)
        );
        println!("  Host:     {}", format_bytes(assembled.host_size));
        println!(
            "  Payload:  {} compressed, {} uncompressed",
            format_bytes(assembled.payload_size),
            format_bytes(assembled.uncompressed_size)
        );
        println!("  Checksum: {}", assembled.checksum);

        Ok(ExitStatus::Success)
    }
}
