//! Payload checksums.
//!
//! Checksums always cover the compressed payload exactly as stored, so
//! verification does not depend on the compressor being deterministic.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Prefix naming the digest algorithm in a checksum string.
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Calculate the checksum of `data` as `"sha256:<lowercase hex>"`.
pub fn checksum(data: &[u8]) -> String {
    format!("{}{}", CHECKSUM_PREFIX, hex::encode(Sha256::digest(data)))
}

/// Calculate the checksum of everything `reader` yields.
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{}{}", CHECKSUM_PREFIX, hex::encode(hasher.finalize())))
}
