//! Payload transcoding between a directory tree and a compressed tarball.
//!
//! Packing walks the source tree in file-name order without following
//! symlinks. Entry metadata that varies between runs (mtime, ownership) is
//! zeroed, so the same tree always produces the same payload bytes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use tar::{Builder, EntryType};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::compression::Compression;
use crate::sanitize::{ensure_no_symlink_ancestors, is_root_entry, resolve_entry};
use crate::{IoContext, PackError, Result};

/// Default mode for directories when the platform has no permission bits.
const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default mode for files when the platform has no permission bits.
const DEFAULT_FILE_MODE: u32 = 0o644;

/// A compressed payload and the content size it represents.
#[derive(Debug, Clone)]
pub struct PackedPayload {
    /// Compressed tarball.
    pub bytes: Vec<u8>,
    /// Sum of regular file content sizes.
    pub uncompressed_size: u64,
}

/// Counts of what [`unpack`] materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackReport {
    /// Regular files written.
    pub files: usize,
    /// Directories created.
    pub directories: usize,
    /// Symlinks created.
    pub symlinks: usize,
    /// Entries of unsupported kinds that were skipped.
    pub skipped: usize,
}

/// Pack `source_dir` into a compressed tarball.
///
/// The root itself is not emitted. Regular files, directories (including
/// empty ones) and symlinks are stored; other file kinds are skipped.
pub fn pack(source_dir: &Path, compression: Compression) -> Result<PackedPayload> {
    let encoder = compression.encoder(Vec::new())?;
    let mut builder = Builder::new(encoder);
    let mut uncompressed_size = 0u64;

    let walker = WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(source_dir, e))?;
        let path = entry.path();
        let relative = match path.strip_prefix(source_dir) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };

        let metadata = entry.metadata().map_err(|e| walk_error(path, e))?;
        let file_type = metadata.file_type();

        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);

        if file_type.is_dir() {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(mode_of(&metadata, DEFAULT_DIR_MODE));
            header.set_size(0);
            builder
                .append_data(&mut header, relative, io::empty())
                .at("append directory", path)?;
        } else if file_type.is_file() {
            header.set_entry_type(EntryType::Regular);
            header.set_mode(mode_of(&metadata, DEFAULT_FILE_MODE));
            header.set_size(metadata.len());
            let file = File::open(path).at("open file", path)?;
            builder
                .append_data(&mut header, relative, file)
                .at("append file", path)?;
            uncompressed_size += metadata.len();
        } else if file_type.is_symlink() {
            let target = fs::read_link(path).at("read symlink", path)?;
            header.set_entry_type(EntryType::Symlink);
            header.set_mode(0o777);
            header.set_size(0);
            builder
                .append_link(&mut header, relative, &target)
                .at("append symlink", path)?;
        } else {
            warn!(path = %path.display(), "skipping unsupported file type");
        }
    }

    let encoder = builder.into_inner().during("finish tar stream")?;
    let bytes = encoder.finish().during("finish compression")?;

    debug!(
        source = %source_dir.display(),
        compressed = bytes.len(),
        uncompressed = uncompressed_size,
        "packed payload"
    );

    Ok(PackedPayload {
        bytes,
        uncompressed_size,
    })
}

/// Decompress `compressed` and materialize its entries under `dest_dir`.
///
/// Aborts on the first entry whose path would escape `dest_dir`; entries
/// before it have already been written.
pub fn unpack(compressed: &[u8], compression: Compression, dest_dir: &Path) -> Result<UnpackReport> {
    let decoder = compression.decoder(compressed)?;
    unpack_reader(decoder, dest_dir)
}

/// Materialize an uncompressed tar stream under `dest_dir`.
///
/// A directory entry naming `dest_dir` itself is skipped; any other entry
/// naming it is rejected as [`PackError::PathTraversal`].
pub fn unpack_reader<R: Read>(reader: R, dest_dir: &Path) -> Result<UnpackReport> {
    let mut archive = tar::Archive::new(reader);
    let mut report = UnpackReport::default();

    let entries = archive.entries().during("read payload archive")?;
    for entry in entries {
        let mut entry = entry.during("read payload entry")?;
        let entry_path = entry.path().during("read entry path")?.into_owned();
        if entry.header().entry_type() == EntryType::Directory && is_root_entry(&entry_path) {
            debug!(entry = %entry_path.display(), "skipping root directory entry");
            continue;
        }
        let target = resolve_entry(dest_dir, &entry_path)?;
        ensure_no_symlink_ancestors(dest_dir, &target, &entry_path)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target).at("create directory", &target)?;
                report.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                create_parent(&target)?;
                remove_existing_link(&target)?;
                let mode = entry.header().mode().unwrap_or(DEFAULT_FILE_MODE);
                let mut file = create_file(&target, mode)?;
                io::copy(&mut entry, &mut file).at("write file", &target)?;
                file.flush().at("write file", &target)?;
                set_mode(&target, mode)?;
                report.files += 1;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .during("read symlink target")?
                    .ok_or_else(|| PackError::Stream {
                        operation: "read symlink target",
                        source: io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("symlink {} has no target", entry_path.display()),
                        ),
                    })?
                    .into_owned();
                create_parent(&target)?;
                remove_existing(&target)?;
                create_symlink(&link, &target)?;
                report.symlinks += 1;
            }
            other => {
                debug!(entry = %entry_path.display(), kind = ?other, "skipping unsupported entry");
                report.skipped += 1;
            }
        }
    }

    debug!(
        dest = %dest_dir.display(),
        files = report.files,
        directories = report.directories,
        symlinks = report.symlinks,
        "unpacked payload"
    );

    Ok(report)
}

fn walk_error(path: &Path, err: walkdir::Error) -> PackError {
    PackError::Io {
        operation: "walk source directory",
        path: err.path().unwrap_or(path).to_path_buf(),
        source: err.into(),
    }
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_metadata: &fs::Metadata, default: u32) -> u32 {
    default
}

fn create_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).at("create parent directory", parent)?;
    }
    Ok(())
}

/// Remove whatever exists at `target`. Directories are only removed when empty.
fn remove_existing(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir(target).at("remove existing path", target),
        Ok(_) => fs::remove_file(target).at("remove existing path", target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).at("inspect existing path", target),
    }
}

/// Opening a file through a leftover symlink would write outside the root.
fn remove_existing_link(target: &Path) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(target).at("remove existing symlink", target)
        }
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_file(target: &Path, mode: u32) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(target)
        .at("create file", target)
}

#[cfg(not(unix))]
fn create_file(target: &Path, _mode: u32) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(target)
        .at("create file", target)
}

/// The open mode is filtered by the umask and ignored for existing files.
#[cfg(unix)]
fn set_mode(target: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(target, fs::Permissions::from_mode(mode)).at("set permissions", target)
}

#[cfg(not(unix))]
fn set_mode(_target: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target).at("create symlink", target)
}

#[cfg(not(unix))]
fn create_symlink(link: &Path, target: &Path) -> Result<()> {
    warn!(
        link = %link.display(),
        target = %target.display(),
        "symlinks are not supported on this platform, skipping"
    );
    Ok(())
}
