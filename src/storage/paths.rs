use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::StorageError;

/// Collapses `.` and `..` segments of a caller supplied folder.
///
/// Leading separators are dropped so the result is always relative.
/// Returns `None` when a `..` would climb above the starting point.
pub fn normalize_folder(folder: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in folder.components() {
        match component {
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            },
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {},
        }
    }

    Some(out)
}

/// Lexically cleans a path without touching the filesystem.
///
/// `..` above an absolute root is discarded, `..` at the start of a
/// relative path is kept.
pub fn clean(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                },
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {},
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }

    parts.iter().collect()
}

/// Reduces a caller supplied file name to its final component.
pub fn file_name(name: &str) -> Result<String, StorageError> {
    Path::new(name)
        .file_name()
        .and_then(|v| v.to_str())
        .map(ToString::to_string)
        .ok_or(StorageError::InvalidFileName)
}

/// Inserts `_<suffix>` between the stem and the extension of `name`.
pub fn with_unique_suffix(name: &str, suffix: Uuid) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .unwrap_or(name);

    match path.extension().and_then(|v| v.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, suffix.to_simple(), ext),
        None => format!("{}_{}", stem, suffix.to_simple()),
    }
}
