//! Byte layout and header definitions for the container format.
//!
//! Everything in this module is format-fixed: changing any constant
//! requires a new format tag.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compression::Compression;
use crate::{IoContext, PackError, Result};

/// Marker that opens the embedded section.
pub const MAGIC_START: &[u8; MAGIC_START_LEN] = b"CONVEX_BUNDLE_START\0";

/// Marker that closes the embedded section.
pub const MAGIC_END: &[u8; MAGIC_END_LEN] = b"CONVEX_BUNDLE_END\0";

/// Length of [`MAGIC_START`].
pub const MAGIC_START_LEN: usize = 20;

/// Length of [`MAGIC_END`].
pub const MAGIC_END_LEN: usize = 18;

/// Size of the big-endian header length prefix.
pub const HEADER_LENGTH_SIZE: usize = 4;

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 8;

/// Largest header accepted when reading (1 MiB).
pub const MAX_HEADER_SIZE: u32 = 1 << 20;

/// Current header version.
pub const HEADER_VERSION: &str = "1.0.0";

/// Format tag every valid header carries.
pub const HEADER_FORMAT: &str = "selfhost-v1";

/// Fixed-size footer at the end of a container.
///
/// Layout (8 bytes total):
/// ```text
/// Offset  Size  Field
/// 0       8     start_offset (u64 LE) - absolute offset of MAGIC_START
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// Absolute offset of the start marker, equal to the host size.
    pub start_offset: u64,
}

impl Footer {
    /// Serialize footer to bytes.
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        self.start_offset.to_le_bytes()
    }

    /// Deserialize footer from bytes.
    ///
    /// Any 8 bytes decode; whether the offset is meaningful is decided by
    /// checking for the start marker.
    pub fn from_bytes(buf: &[u8; FOOTER_SIZE]) -> Self {
        Self {
            start_offset: u64::from_le_bytes(*buf),
        }
    }
}

/// Metadata describing the embedded payload.
///
/// Missing fields decode to their empty value so that [`Header::validate`]
/// can name exactly what is wrong instead of failing inside the JSON parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Header format version.
    #[serde(default)]
    pub version: String,

    /// Always [`HEADER_FORMAT`].
    #[serde(default)]
    pub format: String,

    /// Compression identifier ("gzip" or "zstd").
    #[serde(default)]
    pub compression: String,

    /// Sum of regular file content sizes in the payload, in bytes.
    #[serde(default)]
    pub bundle_size: i64,

    /// Checksum of the compressed payload ("sha256:<hex>").
    #[serde(default)]
    pub bundle_checksum: String,

    /// Opaque metadata record, stored and returned unmodified.
    #[serde(default)]
    pub manifest: Option<Value>,

    /// Version of the companion tool, may be empty.
    #[serde(default)]
    pub ops_version: String,

    /// RFC 3339 UTC timestamp of assembly.
    #[serde(default)]
    pub created_at: String,
}

impl Header {
    /// Create a header carrying `manifest` with default version, format and
    /// compression.
    pub fn new(manifest: Value) -> Self {
        Self {
            version: HEADER_VERSION.to_string(),
            format: HEADER_FORMAT.to_string(),
            compression: Compression::default().to_string(),
            bundle_size: 0,
            bundle_checksum: String::new(),
            manifest: Some(manifest),
            ops_version: String::new(),
            created_at: String::new(),
        }
    }

    /// Parsed compression identifier.
    pub fn compression(&self) -> Result<Compression> {
        self.compression.parse()
    }

    /// Check that every required field is present and consistent.
    pub fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(PackError::header("version", "is required"));
        }
        if self.format != HEADER_FORMAT {
            return Err(PackError::header(
                "format",
                format!("expected {:?}, got {:?}", HEADER_FORMAT, self.format),
            ));
        }
        if self.compression().is_err() {
            return Err(PackError::header(
                "compression",
                format!("expected \"gzip\" or \"zstd\", got {:?}", self.compression),
            ));
        }
        if self.bundle_size <= 0 {
            return Err(PackError::header("bundleSize", "must be positive"));
        }
        if self.bundle_checksum.is_empty() {
            return Err(PackError::header("bundleChecksum", "is required"));
        }
        if self.manifest.is_none() {
            return Err(PackError::header("manifest", "is required"));
        }
        if self.created_at.is_empty() {
            return Err(PackError::header("createdAt", "is required"));
        }
        Ok(())
    }
}

/// Serialize a header to its canonical JSON bytes.
pub fn encode(header: &Header) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(header)?)
}

/// Deserialize a header from JSON bytes.
pub fn decode(data: &[u8]) -> Result<Header> {
    Ok(serde_json::from_slice(data)?)
}

/// Write `header` with its 4-byte big-endian length prefix.
///
/// Returns the total number of bytes written, prefix included.
pub fn write_framed<W: Write>(writer: &mut W, header: &Header) -> Result<usize> {
    let data = encode(header)?;
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= MAX_HEADER_SIZE)
        .ok_or(PackError::HeaderTooLarge {
            size: data.len() as u64,
            max: u64::from(MAX_HEADER_SIZE),
        })?;

    writer
        .write_all(&len.to_be_bytes())
        .during("write header length")?;
    writer.write_all(&data).during("write header data")?;

    Ok(HEADER_LENGTH_SIZE + data.len())
}

/// Read a length-prefixed header.
///
/// The declared length is checked against [`MAX_HEADER_SIZE`] before any
/// buffer is allocated.
pub fn read_framed<R: Read>(reader: &mut R) -> Result<Header> {
    let mut len_buf = [0u8; HEADER_LENGTH_SIZE];
    reader
        .read_exact(&mut len_buf)
        .during("read header length")?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_HEADER_SIZE {
        return Err(PackError::HeaderTooLarge {
            size: u64::from(len),
            max: u64::from(MAX_HEADER_SIZE),
        });
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data).during("read header data")?;

    decode(&data)
}
