//! Destination key mapping for uploads

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::path::RemotePath;

/// How files found under a source directory are laid out at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyLayout {
    /// Every file lands directly under the destination prefix by base name.
    /// Files in different sub-directories that share a base name overwrite
    /// each other, last one wins.
    #[default]
    Flatten,
    /// Keep the path relative to the walked root
    Preserve,
}

/// Compute the destination object for `file`
///
/// For a single-file source the destination key is used verbatim unless it
/// is empty or ends with `/`, in which case the file's base name is appended.
/// For a directory source the key is the destination prefix followed by the
/// base name (or the relative path under `source_root` with
/// [`KeyLayout::Preserve`]). The bucket never changes.
pub fn map_key(
    file: &Path,
    source_root: &Path,
    dest: &RemotePath,
    source_is_dir: bool,
    layout: KeyLayout,
) -> RemotePath {
    let base_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string_lossy().into_owned());

    if !source_is_dir {
        let key = if dest.is_prefix() {
            format!("{}{base_name}", dest.key)
        } else {
            dest.key.clone()
        };
        return RemotePath::new(&dest.bucket, key);
    }

    let mut key = dest.key.clone();
    if !key.is_empty() && !key.ends_with('/') {
        key.push('/');
    }

    match layout {
        KeyLayout::Flatten => key.push_str(&base_name),
        KeyLayout::Preserve => match relative_key(file, source_root) {
            Some(rel) => key.push_str(&rel),
            None => key.push_str(&base_name),
        },
    }

    RemotePath::new(&dest.bucket, key)
}

/// `file` relative to `root` as a `/`-separated key, if it lies beneath it
fn relative_key(file: &Path, root: &Path) -> Option<String> {
    let rel = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
