//! Payload extraction from a container.
//!
//! The checksum is compared before anything is written to the destination,
//! so a corrupted container never leaves a partial tree behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::checksum::checksum;
use crate::format::Header;
use crate::locate::{current_exe, Locator};
use crate::payload;
use crate::{IoContext, PackError, Result};

/// Options for extracting an embedded payload.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Container to read. Defaults to the running executable.
    pub executable_path: Option<PathBuf>,
    /// Directory to extract into, created if absent.
    pub output_dir: PathBuf,
    /// Skip checksum verification.
    pub skip_verify: bool,
}

/// Extract using [`ExtractOptions`].
pub fn extract_with(opts: &ExtractOptions) -> Result<Header> {
    let path = match &opts.executable_path {
        Some(path) => path.clone(),
        None => current_exe()?,
    };
    extract(&path, &opts.output_dir, opts.skip_verify)
}

/// Extract the payload embedded in `path` into `dest_dir`.
///
/// Returns the container header.
pub fn extract(path: impl AsRef<Path>, dest_dir: impl AsRef<Path>, skip_verify: bool) -> Result<Header> {
    let dest_dir = dest_dir.as_ref();
    let mut locator = Locator::open(path.as_ref())?;
    let compressed = locator.read_payload()?;

    if skip_verify {
        debug!(path = %locator.path().display(), "skipping checksum verification");
    } else {
        let actual = checksum(&compressed);
        if actual != locator.header.bundle_checksum {
            return Err(PackError::ChecksumMismatch {
                expected: locator.header.bundle_checksum.clone(),
                actual,
            });
        }
    }

    let decoder = locator.header.compression()?.decoder(compressed.as_slice())?;
    fs::create_dir_all(dest_dir).at("create output directory", dest_dir)?;

    let report = payload::unpack_reader(decoder, dest_dir)?;
    info!(
        path = %locator.path().display(),
        dest = %dest_dir.display(),
        files = report.files,
        directories = report.directories,
        symlinks = report.symlinks,
        "extracted payload"
    );

    Ok(locator.header)
}
