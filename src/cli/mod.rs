//! CLI command implementations.

pub mod create;
pub mod extract;
pub mod inspect;
pub mod verify;

use std::process::ExitCode;

use selfhost_pack::PackError;
use thiserror::Error;

/// Process exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    Success = 0,
    GeneralError = 1,
    InvalidArguments = 2,
    VerificationFailed = 3,
    PlatformMismatch = 4,
    ExtractionFailed = 5,
    /// Reserved for installers layered on top of extraction.
    #[allow(dead_code)]
    InstallationFailed = 6,
}

impl ExitStatus {
    /// Status for an error raised outside extraction.
    pub fn for_error(err: &PackError) -> Self {
        match err {
            PackError::Validation(_) | PackError::InvalidCompression(_) => Self::InvalidArguments,
            PackError::ChecksumMismatch { .. } => Self::VerificationFailed,
            PackError::PlatformMismatch { .. } => Self::PlatformMismatch,
            _ => Self::GeneralError,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

/// A failed command and the status it exits with.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct CommandError {
    pub status: ExitStatus,
    #[source]
    pub source: PackError,
}

impl CommandError {
    /// Wrap an error raised while extracting.
    ///
    /// Checksum and platform failures keep their own status.
    pub fn extraction(source: PackError) -> Self {
        let status = match ExitStatus::for_error(&source) {
            s @ (ExitStatus::VerificationFailed | ExitStatus::PlatformMismatch) => s,
            _ => ExitStatus::ExtractionFailed,
        };
        Self { status, source }
    }
}

impl From<PackError> for CommandError {
    fn from(source: PackError) -> Self {
        Self {
            status: ExitStatus::for_error(&source),
            source,
        }
    }
}

/// Result type for CLI commands.
pub type CommandResult = std::result::Result<ExitStatus, CommandError>;

/// Format a byte count for display.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for_error() {
        let cases = [
            (PackError::Validation("x".into()), ExitStatus::InvalidArguments),
            (PackError::InvalidCompression("lz4".into()), ExitStatus::InvalidArguments),
            (
                PackError::ChecksumMismatch {
                    expected: "a".into(),
                    actual: "b".into(),
                },
                ExitStatus::VerificationFailed,
            ),
            (
                PackError::PlatformMismatch {
                    declared: "a".into(),
                    host: "b".into(),
                },
                ExitStatus::PlatformMismatch,
            ),
            (PackError::UnsupportedCompression("zstd".into()), ExitStatus::GeneralError),
        ];
        for (err, expected) in cases {
            assert_eq!(ExitStatus::for_error(&err), expected, "{err}");
        }
    }

    #[test]
    fn test_extraction_status() {
        let err = CommandError::extraction(PackError::PathTraversal {
            entry: "../x".into(),
        });
        assert_eq!(err.status, ExitStatus::ExtractionFailed);

        let err = CommandError::extraction(PackError::ChecksumMismatch {
            expected: "a".into(),
            actual: "b".into(),
        });
        assert_eq!(err.status, ExitStatus::VerificationFailed);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success as u8, 0);
        assert_eq!(ExitStatus::ExtractionFailed as u8, 5);
        assert_eq!(ExitStatus::InstallationFailed as u8, 6);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 + 512 * 1024), "3.5 MiB");
    }
}
