use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Create the directory if it doesn’t exist; error if a non-directory exists there.
pub(crate) fn ensure_dir_exists(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory {}", path.display()))?;
    }
    Ok(())
}

/// Create the parent directory of a file path.
pub(crate) fn ensure_parent_exists(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Files directly inside `dir` with the given extension, sorted by name.
/// A missing directory yields an empty list.
pub(crate) fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() { return Ok(Vec::new()) }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Sub-directories directly inside `dir`, sorted by name.
pub(crate) fn list_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() { return Ok(Vec::new()) }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() { dirs.push(path) }
    }
    dirs.sort();
    Ok(dirs)
}

/// File name of a path as UTF-8 (lossy).
#[inline]
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// File stem of a path as UTF-8 (lossy).
#[inline]
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Recursively copy `src` into `dest`, recreating the directory structure.
pub(crate) fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<usize> {
    ensure_dir_exists(dest)?;
    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            ensure_dir_exists(&target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {} to {}", entry.path().display(), target.display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursive_copy_keeps_structure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a.shp"), b"a").unwrap();
        fs::write(src.join("nested").join("b.dbf"), b"b").unwrap();

        let dest = dir.path().join("dest");
        assert_eq!(copy_dir_recursive(&src, &dest).unwrap(), 2);
        assert_eq!(fs::read(dest.join("nested").join("b.dbf")).unwrap(), b"b");
    }

    #[test]
    fn listing_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.shp", "a.shp", "a.dbf"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = list_files(dir.path(), "shp").unwrap().iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.shp", "b.shp"]);
        assert!(list_files(&dir.path().join("missing"), "shp").unwrap().is_empty());
    }
}
