//! Self-detection of embedded containers.
//!
//! Detection never assumes anything about the host executable: it trusts
//! only the footer and the start marker the footer points at.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::format::{self, Footer, Header, FOOTER_SIZE, MAGIC_END_LEN, MAGIC_START, MAGIC_START_LEN};
use crate::{IoContext, PackError, Result};

/// Outcome of probing a file for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionResult {
    /// Whether the file carries an embedded container.
    pub is_container: bool,
    /// Absolute offset of the start marker, zero when absent.
    pub offset: u64,
}

impl DetectionResult {
    fn absent() -> Self {
        Self::default()
    }

    fn found(offset: u64) -> Self {
        Self {
            is_container: true,
            offset,
        }
    }
}

/// Check whether `path` contains an embedded container.
///
/// A file without one yields `is_container == false`; only I/O failures
/// are errors. The file is opened read-only.
pub fn detect(path: impl AsRef<Path>) -> Result<DetectionResult> {
    let path = path.as_ref();
    let mut file = File::open(path).at("open file", path)?;
    detect_in(&mut file, path)
}

/// Check whether the running executable contains an embedded container.
pub fn detect_self() -> Result<DetectionResult> {
    detect(current_exe()?)
}

/// Read the header of the container embedded in `path`.
pub fn read_header(path: impl AsRef<Path>) -> Result<Header> {
    Ok(Locator::open(path.as_ref())?.header)
}

/// Read the header of the container embedded in the running executable.
pub fn read_self_header() -> Result<Header> {
    read_header(current_exe()?)
}

pub(crate) fn current_exe() -> Result<PathBuf> {
    std::env::current_exe().during("resolve current executable")
}

fn detect_in(file: &mut File, path: &Path) -> Result<DetectionResult> {
    let size = file.metadata().at("stat file", path)?.len();
    if size < FOOTER_SIZE as u64 {
        return Ok(DetectionResult::absent());
    }

    file.seek(SeekFrom::Start(size - FOOTER_SIZE as u64))
        .at("seek to footer", path)?;
    let mut footer_bytes = [0u8; FOOTER_SIZE];
    file.read_exact(&mut footer_bytes).at("read footer", path)?;
    let offset = Footer::from_bytes(&footer_bytes).start_offset;

    if offset >= size - FOOTER_SIZE as u64 {
        return Ok(DetectionResult::absent());
    }

    file.seek(SeekFrom::Start(offset))
        .at("seek to start marker", path)?;
    let mut marker = [0u8; MAGIC_START_LEN];
    match file.read_exact(&mut marker) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Ok(DetectionResult::absent());
        }
        Err(e) => return Err(e).at("read start marker", path),
    }

    if &marker != MAGIC_START {
        return Ok(DetectionResult::absent());
    }

    debug!(path = %path.display(), offset, "found embedded container");
    Ok(DetectionResult::found(offset))
}

/// An open container with its header read and payload bounds computed.
pub(crate) struct Locator {
    file: File,
    path: PathBuf,
    pub(crate) header: Header,
    pub(crate) payload_start: u64,
    pub(crate) payload_len: u64,
}

impl Locator {
    /// Open `path`, failing with [`PackError::NotAContainer`] if it has no
    /// embedded container.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path).at("open file", path)?;
        let detection = detect_in(&mut file, path)?;
        if !detection.is_container {
            return Err(PackError::NotAContainer(path.to_path_buf()));
        }

        file.seek(SeekFrom::Start(detection.offset + MAGIC_START_LEN as u64))
            .at("seek to header", path)?;
        let header = format::read_framed(&mut file)?;
        let payload_start = file.stream_position().at("locate payload", path)?;

        let size = file.metadata().at("stat file", path)?.len();
        let trailer = (MAGIC_END_LEN + FOOTER_SIZE) as u64;
        let payload_len = size
            .checked_sub(payload_start)
            .and_then(|n| n.checked_sub(trailer))
            .ok_or_else(|| PackError::Truncated(path.to_path_buf()))?;

        debug!(
            path = %path.display(),
            payload_start,
            payload_len,
            "located payload"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            payload_start,
            payload_len,
        })
    }

    /// Reader over exactly the payload bytes.
    pub(crate) fn payload_reader(&mut self) -> Result<io::Take<&mut File>> {
        self.file
            .seek(SeekFrom::Start(self.payload_start))
            .at("seek to payload", &self.path)?;
        Ok((&mut self.file).take(self.payload_len))
    }

    /// Read the whole payload into memory.
    pub(crate) fn read_payload(&mut self) -> Result<Vec<u8>> {
        let len = usize::try_from(self.payload_len).map_err(|_| {
            PackError::Io {
                operation: "read payload",
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::OutOfMemory, "payload exceeds address space"),
            }
        })?;
        let mut payload = vec![0u8; len];
        self.file
            .seek(SeekFrom::Start(self.payload_start))
            .at("seek to payload", &self.path)?;
        self.file
            .read_exact(&mut payload)
            .at("read payload", &self.path)?;
        Ok(payload)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
