//! Walks the workspace tree respecting ignore rules, yielding candidate
//! file paths (`spec.md §4.5`/`§6`).

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::config::{is_supported_extension, DEFAULT_EXCLUDE_DIRS};
use crate::error::Result;

const MAX_DEPTH: usize = 50;

pub struct Scanner<'a> {
    root: &'a Path,
    max_file_size: u64,
    extra_excludes: &'a [String],
}

impl<'a> Scanner<'a> {
    pub fn new(root: &'a Path, max_file_size: u64, extra_excludes: &'a [String]) -> Self {
        Self { root, max_file_size, extra_excludes }
    }

    /// Yields workspace-relative paths of every indexable file under the
    /// root, honoring `.gitignore`, the default build/output exclusion
    /// list, and `max_file_size`. Descends at most 50 levels and never
    /// follows symlinked directories, so a symlink loop cannot hang the
    /// walk.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut walker = WalkBuilder::new(self.root);
        walker
            .max_depth(Some(MAX_DEPTH))
            .follow_links(false)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);

        let mut out = Vec::new();
        for entry in walker.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if is_excluded_dir_component(path, self.root, self.extra_excludes) {
                continue;
            }
            let Some(file_type) = entry.file_type() else { continue };
            if !file_type.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
            if !is_supported_extension(&ext.to_ascii_lowercase()) {
                continue;
            }
            let Ok(metadata) = path.metadata() else { continue };
            if metadata.len() > self.max_file_size {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(self.root) {
                out.push(rel.to_path_buf());
            }
        }
        Ok(out)
    }
}

/// Refuses a workspace-relative path that canonicalizes outside `root` —
/// a symlink or a `..`-laden path escaping the workspace — before it is
/// ever opened. Used by the Ingestor so a watcher event or a crafted
/// relative path can't make it read a file outside the indexed workspace.
pub fn validate_within_workspace(root: &Path, relative_path: &Path) -> Result<PathBuf> {
    let candidate = root.join(relative_path);
    let canonical_root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let canonical_candidate = dunce::canonicalize(&candidate).unwrap_or(candidate);
    if canonical_candidate.starts_with(&canonical_root) {
        Ok(canonical_candidate)
    } else {
        Err(crate::error::Error::BadRequest(format!(
            "path {} escapes workspace root {}",
            canonical_candidate.display(),
            canonical_root.display()
        )))
    }
}

fn is_excluded_dir_component(path: &Path, root: &Path, extra_excludes: &[String]) -> bool {
    let Ok(rel) = path.strip_prefix(root) else { return false };
    for component in rel.components() {
        let name = component.as_os_str().to_string_lossy();
        if DEFAULT_EXCLUDE_DIRS.contains(&name.as_ref()) {
            return true;
        }
        if name.ends_with(".egg-info") {
            return true;
        }
        if extra_excludes.iter().any(|p| p == name.as_ref()) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_supported_files_and_skips_excluded_dirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "export const x = 1;").unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/vendored.ts"), "ignored").unwrap();
        fs::write(dir.path().join("readme.bin"), "not indexable").unwrap();

        let scanner = Scanner::new(dir.path(), 1024 * 1024, &[]);
        let found = scanner.scan().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], PathBuf::from("a.ts"));
    }

    #[test]
    fn skips_files_over_max_size() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.ts"), "x".repeat(100)).unwrap();
        let scanner = Scanner::new(dir.path(), 10, &[]);
        let found = scanner.scan().unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn validate_within_workspace_accepts_nested_path() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.ts"), "x").unwrap();
        assert!(validate_within_workspace(dir.path(), Path::new("src/a.ts")).is_ok());
    }

    #[test]
    fn validate_within_workspace_rejects_escaping_path() {
        let dir = tempdir().unwrap();
        let result = validate_within_workspace(dir.path(), Path::new("../../etc/passwd"));
        assert!(result.is_err());
    }
}
