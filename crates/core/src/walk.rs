//! Recursive directory walking

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Lazily walk `root`, yielding every regular file beneath it
///
/// Symlinks are followed, so a link to a directory is descended into and a
/// link to a file is yielded. Directories and special files are never
/// yielded. Traversal errors (permission denied, dangling links, loops) are
/// returned as `Error::Walk`; callers are expected to stop at the first one.
/// Siblings come out sorted by file name.
pub fn walk(root: &Path) -> impl Iterator<Item = Result<PathBuf>> + use<> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(Ok(e.into_path())),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })
}
