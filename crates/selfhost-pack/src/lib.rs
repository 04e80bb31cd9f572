//! Self-detecting executable containers.
//!
//! This crate appends a compressed directory tree to an arbitrary host
//! executable, producing a single file that can later discover, verify and
//! extract its own payload without any external index.
//!
//! # Container Format (selfhost-v1)
//!
//! ```text
//! +---------------------------+
//! | Host Executable           |  copied verbatim, never parsed
//! +---------------------------+
//! | Start marker (20 bytes)   |  "CONVEX_BUNDLE_START\0"
//! +---------------------------+
//! | Header length (u32 BE)    |
//! | Header (JSON)             |  <= 1 MiB
//! +---------------------------+
//! | Payload (tar.gz)          |  length derived from file size
//! +---------------------------+
//! | End marker (18 bytes)     |  "CONVEX_BUNDLE_END\0"
//! +---------------------------+
//! | Footer (u64 LE)           |  offset of the start marker
//! +---------------------------+
//! ```
//!
//! Detection reads the footer, seeks to the offset it names and checks for
//! the start marker. A file without a container is a normal outcome, not an
//! error.

#![deny(missing_docs)]

pub mod assembler;
pub mod checksum;
pub mod compression;
pub mod extract;
pub mod format;
pub mod locate;
pub mod manifest;
pub mod payload;
pub mod platform;
mod sanitize;
pub mod verify;

pub use assembler::{AssembledInfo, Assembler, DEFAULT_REQUIRED_ENTRIES};
pub use compression::Compression;
pub use extract::{extract, extract_with, ExtractOptions};
pub use format::{Footer, Header, FOOTER_SIZE, HEADER_FORMAT, MAGIC_END, MAGIC_START};
pub use locate::{detect, detect_self, read_header, read_self_header, DetectionResult};
pub use manifest::BundleManifest;
pub use platform::{check_platform, host_platform};
pub use verify::{verify, verify_self, VerificationResult};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// A precondition failed before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Header is malformed or semantically inconsistent.
    #[error("invalid header: {field}: {reason}")]
    HeaderInvalid {
        /// Wire name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Declared header length exceeds the hard ceiling.
    #[error("header size {size} exceeds maximum allowed size {max}")]
    HeaderTooLarge {
        /// Declared length.
        size: u64,
        /// Ceiling.
        max: u64,
    },

    /// File has no embedded container.
    #[error("not a container: {} does not contain an embedded bundle", .0.display())]
    NotAContainer(PathBuf),

    /// Container is shorter than its header and trailer require.
    #[error("container truncated: {}: header ends past the payload region", .0.display())]
    Truncated(PathBuf),

    /// Archive entry would escape the extraction root.
    #[error("path traversal detected: entry {} escapes the extraction root", .entry.display())]
    PathTraversal {
        /// Entry path as stored in the archive.
        entry: PathBuf,
    },

    /// Known compression algorithm that is not implemented yet.
    #[error("{0} compression is not yet implemented")]
    UnsupportedCompression(String),

    /// Unknown compression identifier.
    #[error("invalid compression: {0} (must be \"gzip\" or \"zstd\")")]
    InvalidCompression(String),

    /// Payload checksum does not match the header.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum recorded in the header.
        expected: String,
        /// Checksum of the payload on disk.
        actual: String,
    },

    /// Bundle was built for another platform.
    #[error("platform mismatch: bundle is for {declared}, host is {host}")]
    PlatformMismatch {
        /// Platform declared by the bundle.
        declared: String,
        /// Platform of the running host.
        host: String,
    },

    /// Filesystem operation failed.
    #[error("{operation} failed: {}: {source}", path.display())]
    Io {
        /// What was being done.
        operation: &'static str,
        /// File it was done to.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Stream operation without an associated path failed.
    #[error("{operation} failed: {source}")]
    Stream {
        /// What was being done.
        operation: &'static str,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackError {
    pub(crate) fn header(field: &'static str, reason: impl Into<String>) -> Self {
        Self::HeaderInvalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, PackError>;

/// Attach operation and path context to I/O results.
pub(crate) trait IoContext<T> {
    fn at(self, operation: &'static str, path: &Path) -> Result<T>;
    fn during(self, operation: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, operation: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| PackError::Io {
            operation,
            path: path.to_path_buf(),
            source,
        })
    }

    fn during(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| PackError::Stream { operation, source })
    }
}
