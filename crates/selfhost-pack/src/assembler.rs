//! Container assembly.
//!
//! Combines the host executable, start marker, framed header, compressed
//! payload, end marker and footer into a single executable file. The output
//! is written in place and is not renamed atomically; callers that need
//! atomicity should assemble to a temporary path and rename it themselves.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::checksum::checksum;
use crate::compression::Compression;
use crate::format::{self, Footer, Header, FOOTER_SIZE, MAGIC_END, MAGIC_START};
use crate::payload;
use crate::{IoContext, PackError, Result};

/// Entries a bundle directory produced by the packaging step must contain.
pub const DEFAULT_REQUIRED_ENTRIES: &[&str] = &[
    "manifest.json",
    "backend",
    "convex.db",
    "credentials.json",
    "storage",
];

/// Builder for self-detecting containers.
#[derive(Debug, Clone)]
pub struct Assembler {
    host_path: PathBuf,
    source_dir: PathBuf,
    compression: Compression,
    metadata: Value,
    companion_version: String,
    required_entries: Vec<String>,
}

impl Assembler {
    /// Create an assembler for the given host executable and payload directory.
    pub fn new(host_path: impl AsRef<Path>, source_dir: impl AsRef<Path>) -> Self {
        Self {
            host_path: host_path.as_ref().to_path_buf(),
            source_dir: source_dir.as_ref().to_path_buf(),
            compression: Compression::default(),
            metadata: Value::Null,
            companion_version: String::new(),
            required_entries: Vec::new(),
        }
    }

    /// Set the payload compression.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the opaque metadata record embedded in the header.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the companion tool version recorded in the header.
    pub fn with_companion_version(mut self, version: impl Into<String>) -> Self {
        self.companion_version = version.into();
        self
    }

    /// Require each named entry to exist in the source directory.
    pub fn with_required_entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_entries = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Check every precondition without writing anything.
    pub fn check(&self) -> Result<()> {
        let source = &self.source_dir;
        if source.as_os_str().is_empty() {
            return Err(PackError::Validation("bundle directory is required".into()));
        }
        match source.metadata() {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(PackError::Validation(format!(
                    "bundle path is not a directory: {}",
                    source.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PackError::Validation(format!(
                    "bundle directory does not exist: {}",
                    source.display()
                )))
            }
            Err(e) => return Err(e).at("access bundle directory", source),
        }

        for name in &self.required_entries {
            if source.join(name).symlink_metadata().is_err() {
                return Err(PackError::Validation(format!(
                    "bundle is missing required file: {}",
                    name
                )));
            }
        }

        let host = &self.host_path;
        if host.as_os_str().is_empty() {
            return Err(PackError::Validation("host executable is required".into()));
        }
        match host.metadata() {
            Ok(meta) if meta.is_dir() => {
                return Err(PackError::Validation(format!(
                    "host executable path is a directory: {}",
                    host.display()
                )))
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PackError::Validation(format!(
                    "host executable does not exist: {}",
                    host.display()
                )))
            }
            Err(e) => return Err(e).at("access host executable", host),
        }

        if self.metadata.is_null() {
            return Err(PackError::Validation("metadata record is required".into()));
        }

        Ok(())
    }

    /// Assemble the container into `output`.
    ///
    /// On error the output file may be partially written and must not be
    /// trusted.
    pub fn assemble(self, output: impl AsRef<Path>) -> Result<AssembledInfo> {
        let output = output.as_ref();
        self.check()?;

        info!(
            host = %self.host_path.display(),
            source = %self.source_dir.display(),
            compression = %self.compression,
            output = %output.display(),
            "assembling container"
        );

        let payload = payload::pack(&self.source_dir, self.compression)?;
        let bundle_checksum = checksum(&payload.bytes);

        let mut header = Header::new(self.metadata);
        header.compression = self.compression.to_string();
        header.bundle_size = i64::try_from(payload.uncompressed_size)
            .map_err(|_| PackError::header("bundleSize", "exceeds i64"))?;
        header.bundle_checksum = bundle_checksum.clone();
        header.ops_version = self.companion_version;
        header.created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        header.validate()?;

        let out_file = File::create(output).at("create output file", output)?;
        let mut out = BufWriter::new(out_file);

        let mut host = File::open(&self.host_path).at("open host executable", &self.host_path)?;
        let host_size = io::copy(&mut host, &mut out).at("copy host executable", &self.host_path)?;
        debug!(host_size, "copied host executable");

        out.write_all(MAGIC_START).at("write start marker", output)?;
        let header_size = format::write_framed(&mut out, &header)?;
        out.write_all(&payload.bytes).at("write payload", output)?;
        out.write_all(MAGIC_END).at("write end marker", output)?;
        out.write_all(&Footer { start_offset: host_size }.to_bytes())
            .at("write footer", output)?;

        let out_file = out
            .into_inner()
            .map_err(|e| e.into_error())
            .at("flush output file", output)?;
        make_executable(&out_file, output)?;

        let total_size = host_size
            + (MAGIC_START.len() + header_size + MAGIC_END.len() + FOOTER_SIZE) as u64
            + payload.bytes.len() as u64;

        info!(
            output = %output.display(),
            total_size,
            checksum = %bundle_checksum,
            "container assembled"
        );

        Ok(AssembledInfo {
            output: output.to_path_buf(),
            host_size,
            header_size: header_size as u64,
            payload_size: payload.bytes.len() as u64,
            uncompressed_size: payload.uncompressed_size,
            checksum: bundle_checksum,
            total_size,
        })
    }
}

#[cfg(unix)]
fn make_executable(file: &File, path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
        .at("set executable permissions", path)
}

#[cfg(not(unix))]
fn make_executable(_file: &File, _path: &Path) -> Result<()> {
    Ok(())
}

/// Information about an assembled container.
#[derive(Debug, Clone)]
pub struct AssembledInfo {
    /// Path of the container.
    pub output: PathBuf,
    /// Size of the host executable, also the start marker offset.
    pub host_size: u64,
    /// Size of the framed header, length prefix included.
    pub header_size: u64,
    /// Size of the compressed payload.
    pub payload_size: u64,
    /// Sum of regular file content sizes in the payload.
    pub uncompressed_size: u64,
    /// Checksum of the compressed payload.
    pub checksum: String,
    /// Total size of the container.
    pub total_size: u64,
}
