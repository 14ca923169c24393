// ── Local filesystem accessor ────────────────────────────────────────────────

use crate::scp::error::{ScpError, ScpResult};
use crate::scp::types::{EntryKind, EntryMeta};
use std::fs::{self, FileType, Metadata};
use std::io::{self, Read};
use std::path::Path;
use walkdir::WalkDir;

/// Read-only view of the local tree being pushed.
pub trait LocalFs {
    /// Metadata of `path` itself; links are not followed.
    fn stat(&self, path: &Path) -> ScpResult<EntryMeta>;

    fn open(&self, path: &Path) -> ScpResult<Box<dyn Read>>;

    /// Direct children of `path`, in whatever order the OS returns them.
    /// `path` itself must be a directory, not a link to one.
    fn list_dir(&self, path: &Path) -> ScpResult<Vec<EntryMeta>>;
}

/// [`LocalFs`] backed by `std::fs` and `walkdir`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl LocalFs for OsFs {
    fn stat(&self, path: &Path) -> ScpResult<EntryMeta> {
        let meta = fs::symlink_metadata(path).map_err(|e| ScpError::local_io(path, e))?;
        Ok(EntryMeta {
            name: base_name(path)?,
            path: path.to_path_buf(),
            kind: kind_of(meta.file_type()),
            size: meta.len(),
            mode: mode_of(&meta),
        })
    }

    fn open(&self, path: &Path) -> ScpResult<Box<dyn Read>> {
        let file = fs::File::open(path).map_err(|e| ScpError::local_io(path, e))?;
        Ok(Box::new(file))
    }

    fn list_dir(&self, path: &Path) -> ScpResult<Vec<EntryMeta>> {
        let root = fs::symlink_metadata(path).map_err(|e| ScpError::local_io(path, e))?;
        let kind = kind_of(root.file_type());
        if kind != EntryKind::Directory {
            return Err(ScpError::UnsupportedEntry {
                path: path.to_path_buf(),
                kind,
            });
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .follow_root_links(false)
        {
            let entry = entry.map_err(|e| {
                let at = e.path().unwrap_or(path).to_path_buf();
                ScpError::local_io(at, io::Error::from(e))
            })?;
            let meta = entry
                .metadata()
                .map_err(|e| ScpError::local_io(entry.path(), io::Error::from(e)))?;
            entries.push(EntryMeta {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path().to_path_buf(),
                kind: kind_of(entry.file_type()),
                size: meta.len(),
                mode: mode_of(&meta),
            });
        }
        Ok(entries)
    }
}

/// Last component of `path`. Paths such as `.` or `dir/..` are resolved
/// first so the remote side still receives a real name.
pub(crate) fn base_name(path: &Path) -> ScpResult<String> {
    if let Some(name) = path.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    let resolved = fs::canonicalize(path).map_err(|e| ScpError::local_io(path, e))?;
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ScpError::InvalidName(format!("'{}' has no base name", path.display()))
        })
}

fn kind_of(file_type: FileType) -> EntryKind {
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

#[cfg(unix)]
fn mode_of(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &Metadata) -> u32 {
    if meta.is_dir() {
        0o755
    } else if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
