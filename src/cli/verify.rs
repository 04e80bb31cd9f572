//! Verify command.

use std::path::PathBuf;

use clap::Args;
use selfhost_pack::{verify, verify_self};

use super::{CommandResult, ExitStatus};

/// Check the payload against the checksum recorded in its header.
///
/// Exits 3 when the checksums differ.
#[derive(Args, Debug)]
pub struct VerifyCmd {
    /// Container to verify (defaults to this executable)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
}

impl VerifyCmd {
    pub fn run(self) -> CommandResult {
        let result = match &self.file {
            Some(path) => verify(path)?,
            None => verify_self()?,
        };

        println!("Expected: {}", result.expected_checksum);
        println!("Actual:   {}", result.actual_checksum);

        if result.valid {
            println!("Verification passed");
            Ok(ExitStatus::Success)
        } else {
            eprintln!("Verification failed: payload checksum mismatch");
            Ok(ExitStatus::VerificationFailed)
        }
    }
}
