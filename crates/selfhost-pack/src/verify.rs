//! Payload integrity verification.

use std::path::Path;

use tracing::{debug, warn};

use crate::checksum::checksum_reader;
use crate::locate::{current_exe, Locator};
use crate::{IoContext, Result};

/// Outcome of comparing the stored payload against its header checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Whether the checksums match.
    pub valid: bool,
    /// Checksum recorded in the header.
    pub expected_checksum: String,
    /// Checksum of the payload on disk.
    pub actual_checksum: String,
}

/// Verify the integrity of the container embedded in `path`.
///
/// The payload is hashed as a stream; nothing is extracted.
pub fn verify(path: impl AsRef<Path>) -> Result<VerificationResult> {
    let path = path.as_ref();
    let mut locator = Locator::open(path)?;
    let expected_checksum = locator.header.bundle_checksum.clone();

    let reader = locator.payload_reader()?;
    let actual_checksum = checksum_reader(reader).at("hash payload", path)?;
    let valid = actual_checksum == expected_checksum;

    if valid {
        debug!(path = %path.display(), checksum = %actual_checksum, "payload verified");
    } else {
        warn!(
            path = %path.display(),
            expected = %expected_checksum,
            actual = %actual_checksum,
            "payload checksum mismatch"
        );
    }

    Ok(VerificationResult {
        valid,
        expected_checksum,
        actual_checksum,
    })
}

/// Verify the container embedded in the running executable.
pub fn verify_self() -> Result<VerificationResult> {
    verify(current_exe()?)
}
