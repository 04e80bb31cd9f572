//! Containment checks for archive entries.
//!
//! Every entry must land strictly below the extraction root, both lexically
//! and on disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::{PackError, Result};

/// Resolve an archive entry path against the extraction root.
///
/// The entry is normalized lexically; `..` may only cancel components the
/// entry itself introduced. Absolute entries, entries that climb above the
/// root and entries that name the root itself are rejected.
pub(crate) fn resolve_entry(base: &Path, entry: &Path) -> Result<PathBuf> {
    match normalize(entry) {
        Some(relative) if !relative.as_os_str().is_empty() => Ok(base.join(relative)),
        _ => Err(traversal(entry)),
    }
}

/// Whether `entry` normalizes to the extraction root (`.`, `./`, `a/..`).
pub(crate) fn is_root_entry(entry: &Path) -> bool {
    normalize(entry).is_some_and(|relative| relative.as_os_str().is_empty())
}

fn normalize(entry: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    let mut depth = 0usize;

    for component in entry.components() {
        match component {
            Component::Normal(part) => {
                relative.push(part);
                depth += 1;
            }
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                relative.pop();
                depth -= 1;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(relative)
}

/// Reject targets that would be written through a symlink inside the root.
///
/// An earlier entry may have planted a link at `dir`, which would make a
/// later, lexically contained entry land outside the root.
pub(crate) fn ensure_no_symlink_ancestors(base: &Path, target: &Path, entry: &Path) -> Result<()> {
    let Ok(relative) = target.strip_prefix(base) else {
        return Err(traversal(entry));
    };

    let mut current = base.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Err(traversal(entry)),
            _ => {}
        }
    }

    Ok(())
}

fn traversal(entry: &Path) -> PackError {
    PackError::PathTraversal {
        entry: entry.to_path_buf(),
    }
}
