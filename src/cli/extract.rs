//! Extract command.

use std::path::PathBuf;

use clap::Args;
use selfhost_pack::{
    check_platform, extract_with, read_header, read_self_header, BundleManifest, ExtractOptions,
};
use tracing::{debug, warn};

use super::{CommandError, CommandResult, ExitStatus};

/// Extract the embedded payload into a directory.
///
/// Verification happens before anything is written; a corrupted container
/// leaves the output directory untouched.
///
/// Examples:
///   selfhost extract ./convex-selfhost -o ./data
///   selfhost extract ./convex-selfhost -o ./data --check-platform
#[derive(Args, Debug)]
pub struct ExtractCmd {
    /// Container to extract (defaults to this executable)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Directory to extract into (created if absent)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: PathBuf,

    /// Skip checksum verification
    #[arg(long)]
    pub skip_verify: bool,

    /// Refuse bundles built for another platform
    #[arg(long)]
    pub check_platform: bool,
}

impl ExtractCmd {
    pub fn run(self) -> CommandResult {
        let opts = ExtractOptions {
            executable_path: self.file,
            output_dir: self.output,
            skip_verify: self.skip_verify,
        };

        if self.check_platform {
            let header = match &opts.executable_path {
                Some(path) => read_header(path),
                None => read_self_header(),
            }
            .map_err(CommandError::extraction)?;
            let declared = header.manifest.as_ref().and_then(BundleManifest::platform_of);
            match declared {
                Some(platform) => {
                    check_platform(&platform)?;
                    debug!(platform = %platform, "platform check passed");
                }
                None => warn!("bundle declares no platform, skipping platform check"),
            }
        }

        let header = extract_with(&opts).map_err(CommandError::extraction)?;

        println!("Extracted payload to {}", opts.output_dir.display());
        if let Some(name) = header
            .manifest
            .as_ref()
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
        {
            println!("Bundle: {}", name);
        }
        Ok(ExitStatus::Success)
    }
}
