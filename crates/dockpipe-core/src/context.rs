//! Build-context analysis.
//!
//! Walks the context the way the engine would ship it: files matched by the
//! ignore file are excluded. Gitignore semantics stand in for the engine's
//! own matcher, which agrees on every pattern in common use.

use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// One file that would be sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedFile {
    /// Path relative to the context root.
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Summary of a build context.
#[derive(Debug, Clone, Serialize)]
pub struct ContextReport {
    pub total_bytes: u64,
    pub file_count: usize,
    /// Sorted by path.
    pub files: Vec<TrackedFile>,
    pub large_files: Vec<TrackedFile>,
    pub ignore_file_present: bool,
    /// Recommended patterns absent from the ignore file. Empty when the
    /// ignore file itself is missing.
    pub missing_ignore_patterns: Vec<String>,
    /// SHA-256 over sorted relative paths and sizes.
    pub fingerprint: String,
}

impl ContextReport {
    /// Tracked files with the given extension (no dot).
    pub fn files_with_extension<'a>(
        &'a self,
        ext: &'a str,
    ) -> impl Iterator<Item = &'a TrackedFile> + 'a {
        self.files
            .iter()
            .filter(move |f| f.path.extension().is_some_and(|e| e == ext))
    }
}

/// Options for [`analyze`].
#[derive(Debug, Clone)]
pub struct ContextOptions<'a> {
    pub ignore_file: &'a str,
    pub large_file_bytes: u64,
    pub recommended_patterns: &'a [String],
}

fn normalize_pattern(line: &str) -> &str {
    let mut p = line.trim();
    p = p.strip_prefix("**/").unwrap_or(p);
    p = p.strip_prefix('/').unwrap_or(p);
    p = p.strip_suffix("/**").unwrap_or(p);
    p.strip_suffix('/').unwrap_or(p)
}

/// Recommended patterns not covered by `ignore_text`.
pub fn missing_patterns(ignore_text: &str, recommended: &[String]) -> Vec<String> {
    let present: Vec<&str> = ignore_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('!'))
        .map(normalize_pattern)
        .collect();
    recommended
        .iter()
        .filter(|p| !present.contains(&normalize_pattern(p)))
        .cloned()
        .collect()
}

fn fingerprint(files: &[TrackedFile]) -> String {
    let mut hasher = Sha256::new();
    for f in files {
        hasher.update(f.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(f.size_bytes.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Walk `root` and summarise what the engine would receive.
pub fn analyze(root: &Path, opts: &ContextOptions<'_>) -> io::Result<ContextReport> {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .add_custom_ignore_filename(opts.ignore_file);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.push(TrackedFile { path, size_bytes });
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    let ignore_path = root.join(opts.ignore_file);
    let ignore_file_present = ignore_path.is_file();
    let missing_ignore_patterns = if ignore_file_present {
        missing_patterns(&std::fs::read_to_string(&ignore_path)?, opts.recommended_patterns)
    } else {
        Vec::new()
    };

    let large_files = files
        .iter()
        .filter(|f| f.size_bytes > opts.large_file_bytes)
        .cloned()
        .collect();

    Ok(ContextReport {
        total_bytes: files.iter().map(|f| f.size_bytes).sum(),
        file_count: files.len(),
        fingerprint: fingerprint(&files),
        files,
        large_files,
        ignore_file_present,
        missing_ignore_patterns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn opts(patterns: &[String]) -> ContextOptions<'_> {
        ContextOptions {
            ignore_file: ".dockerignore",
            large_file_bytes: 100,
            recommended_patterns: patterns,
        }
    }

    #[test]
    fn test_ignored_files_are_not_tracked() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".dockerignore"), "*.log\nvenv/\n").unwrap();
        fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        fs::write(dir.path().join("debug.log"), "noise").unwrap();
        fs::create_dir(dir.path().join("venv")).unwrap();
        fs::write(dir.path().join("venv/lib.py"), "x").unwrap();

        let report = analyze(dir.path(), &opts(&[])).unwrap();
        let paths: Vec<_> = report.files.iter().map(|f| f.path.clone()).collect();
        assert!(paths.contains(&PathBuf::from("main.py")));
        assert!(!paths.contains(&PathBuf::from("debug.log")));
        assert!(!paths.iter().any(|p| p.starts_with("venv")));
        assert!(report.ignore_file_present);
    }

    #[test]
    fn test_large_files_and_totals() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.bin"), vec![0u8; 500]).unwrap();
        fs::write(dir.path().join("small.txt"), "abc").unwrap();

        let report = analyze(dir.path(), &opts(&[])).unwrap();
        assert_eq!(report.file_count, 2);
        assert_eq!(report.total_bytes, 503);
        assert_eq!(report.large_files.len(), 1);
        assert_eq!(report.large_files[0].path, PathBuf::from("big.bin"));
        assert!(!report.ignore_file_present);
    }

    #[test]
    fn test_fingerprint_tracks_content_size() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "a").unwrap();
        let first = analyze(dir.path(), &opts(&[])).unwrap().fingerprint;
        let again = analyze(dir.path(), &opts(&[])).unwrap().fingerprint;
        assert_eq!(first, again);

        fs::write(dir.path().join("a.py"), "abc").unwrap();
        let changed = analyze(dir.path(), &opts(&[])).unwrap().fingerprint;
        assert_ne!(first, changed);
        assert_eq!(changed.len(), 64);
    }

    #[test]
    fn test_missing_patterns_normalizes_slashes() {
        let recommended: Vec<String> = [".git", "__pycache__", "*.pyc", ".env", "venv"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let missing = missing_patterns("# comment\n.git/\n**/__pycache__\n/venv\n", &recommended);
        assert_eq!(missing, vec!["*.pyc".to_string(), ".env".to_string()]);
    }
}
