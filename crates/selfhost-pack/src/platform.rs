//! Host platform tokens.
//!
//! Bundles declare the platform they were built for using short tokens such
//! as `linux-x64`. The host token is derived from the OS family and CPU
//! architecture the binary was compiled for.

use crate::{PackError, Result};

/// Known (os, arch) pairs and their bundle tokens.
const PLATFORM_TOKENS: &[(&str, &str, &str)] = &[
    ("linux", "x86_64", "linux-x64"),
    ("linux", "aarch64", "linux-arm64"),
    ("macos", "x86_64", "darwin-x64"),
    ("macos", "aarch64", "darwin-arm64"),
];

/// Platform token for the running host.
pub fn host_platform() -> String {
    platform_token(std::env::consts::OS, std::env::consts::ARCH)
}

/// Map an OS family and architecture to a bundle token.
///
/// Unknown pairs pass through as `"<os>-<arch>"`.
pub fn platform_token(os: &str, arch: &str) -> String {
    PLATFORM_TOKENS
        .iter()
        .find(|(o, a, _)| *o == os && *a == arch)
        .map(|(_, _, token)| token.to_string())
        .unwrap_or_else(|| format!("{}-{}", os, arch))
}

/// Fail with [`PackError::PlatformMismatch`] unless `declared` matches the host.
pub fn check_platform(declared: &str) -> Result<()> {
    let host = host_platform();
    if declared != host {
        return Err(PackError::PlatformMismatch {
            declared: declared.to_string(),
            host,
        });
    }
    Ok(())
}
