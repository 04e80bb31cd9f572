//! Detect and info commands.

use std::path::PathBuf;

use clap::Args;
use selfhost_pack::{
    detect, detect_self, read_header, read_self_header, BundleManifest, Header, PackError,
};

use super::{CommandResult, ExitStatus};

/// Report whether a file carries an embedded container.
///
/// Exits 0 either way; only I/O failures are errors.
#[derive(Args, Debug)]
pub struct DetectCmd {
    /// File to check (defaults to this executable)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

impl DetectCmd {
    pub fn run(self) -> CommandResult {
        let result = match &self.file {
            Some(path) => detect(path)?,
            None => detect_self()?,
        };

        if result.is_container {
            println!("Container found at offset {}", result.offset);
        } else {
            println!("No container found");
        }
        Ok(ExitStatus::Success)
    }
}

/// Print the header of an embedded container.
#[derive(Args, Debug)]
pub struct InfoCmd {
    /// Container to read (defaults to this executable)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Print the raw header as JSON
    #[arg(long)]
    pub json: bool,
}

impl InfoCmd {
    pub fn run(self) -> CommandResult {
        let header = match &self.file {
            Some(path) => read_header(path)?,
            None => read_self_header()?,
        };

        if self.json {
            let text = serde_json::to_string_pretty(&header).map_err(PackError::from)?;
            println!("{}", text);
        } else {
            print_header(&header);
        }
        Ok(ExitStatus::Success)
    }
}

fn print_header(header: &Header) {
    println!("Format:      {} (version {})", header.format, header.version);
    println!("Compression: {}", header.compression);
    println!("Bundle size: {} bytes", header.bundle_size);
    println!("Checksum:    {}", header.bundle_checksum);
    if !header.ops_version.is_empty() {
        println!("Ops version: {}", header.ops_version);
    }
    println!("Created:     {}", header.created_at);

    let Some(record) = &header.manifest else {
        return;
    };
    match BundleManifest::from_value(record) {
        Ok(manifest) => {
            println!("Bundle:      {} {}", manifest.name, manifest.version);
            println!("Platform:    {}", manifest.platform);
            if !manifest.apps.is_empty() {
                println!("Apps:        {}", manifest.apps.join(", "));
            }
        }
        Err(_) => {
            if let Some(platform) = BundleManifest::platform_of(record) {
                println!("Platform:    {}", platform);
            }
        }
    }
}
