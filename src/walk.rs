//! Target file discovery.
//!
//! Walks the target directory with gitignore-aware traversal, keeps files
//! the parser supports, and applies the CLI's exclusion globs. A file
//! target bypasses the walk entirely.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::error::{Result, UnflagError};
use crate::parse::is_supported_path;

/// Compile exclusion globs from the CLI's comma-separated patterns.
pub fn build_exclude_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        let glob = Glob::new(pattern).map_err(|e| {
            UnflagError::config(format!("invalid exclude glob '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| UnflagError::config(format!("exclude globs failed to compile: {e}")))
}

/// Discover the source files to transform under `target`.
///
/// Results are sorted for deterministic processing and reporting order.
/// A directory walk silently skips unrecognized extensions, but naming a
/// single unsupported file as the target is an invocation mistake and is
/// rejected.
pub fn discover_files(target: &Path, excludes: &GlobSet) -> Result<Vec<PathBuf>> {
    if target.is_file() {
        if !is_supported_path(target) {
            return Err(UnflagError::UnsupportedFile(
                target.display().to_string(),
            ));
        }
        if is_excluded(target, target, excludes) {
            return Ok(Vec::new());
        }
        return Ok(vec![target.to_path_buf()]);
    }
    if !target.is_dir() {
        return Err(UnflagError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            target,
        ));
    }

    let mut files = Vec::new();
    for entry in WalkBuilder::new(target).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(%err, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if !is_supported_path(path) || is_excluded(path, target, excludes) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

/// Match exclusion globs against both the full path and the path relative
/// to the target, so `vendor/**` works regardless of how the target was
/// spelled.
fn is_excluded(path: &Path, target: &Path, excludes: &GlobSet) -> bool {
    if excludes.is_empty() {
        return false;
    }
    if excludes.is_match(path) {
        return true;
    }
    path.strip_prefix(target)
        .map(|rel| excludes.is_match(rel))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "const x = 1;\n").unwrap();
    }

    #[test]
    fn discovers_supported_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("b.ts"));
        touch(&tmp.path().join("a.tsx"));
        touch(&tmp.path().join("notes.md"));
        touch(&tmp.path().join("nested/c.js"));

        let excludes = build_exclude_set(&[]).unwrap();
        let files = discover_files(tmp.path(), &excludes).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.tsx", "b.ts", "nested/c.js"]);
    }

    #[test]
    fn exclusion_globs_match_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("src/keep.ts"));
        touch(&tmp.path().join("vendor/skip.ts"));

        let excludes = build_exclude_set(&["vendor/**".to_string()]).unwrap();
        let files = discover_files(tmp.path(), &excludes).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/keep.ts"));
    }

    #[test]
    fn single_file_target() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("one.ts");
        touch(&file);

        let excludes = build_exclude_set(&[]).unwrap();
        let files = discover_files(&file, &excludes).unwrap();
        assert_eq!(files, vec![file]);
    }

    #[test]
    fn bad_glob_is_config_error() {
        let err = build_exclude_set(&["[unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, UnflagError::ConfigInvalid { .. }));
    }

    #[test]
    fn unsupported_single_file_target_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("schema.graphql");
        fs::write(&file, "type Query { ok: Boolean }\n").unwrap();

        let excludes = build_exclude_set(&[]).unwrap();
        let err = discover_files(&file, &excludes).unwrap_err();
        match err {
            UnflagError::UnsupportedFile(path) => {
                assert!(path.ends_with("schema.graphql"), "got: {path}")
            }
            other => panic!("expected UnsupportedFile, got {other:?}"),
        }
    }

    #[test]
    fn gitignored_files_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        // WalkBuilder honors .gitignore inside a repository root.
        fs::create_dir(tmp.path().join(".git")).unwrap();
        fs::write(tmp.path().join(".gitignore"), "generated/\n").unwrap();
        touch(&tmp.path().join("src/a.ts"));
        touch(&tmp.path().join("generated/b.ts"));

        let excludes = build_exclude_set(&[]).unwrap();
        let files = discover_files(tmp.path(), &excludes).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/a.ts"));
    }
}
