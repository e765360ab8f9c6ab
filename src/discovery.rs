//! Source discovery.
//!
//! Recursively scans a directory for template files whose base name matches
//! one of the configured glob patterns, and loads files into source units
//! named relative to their common directory.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::source::{logical_name, SourceUnit};

/// Base-name patterns used when none are configured.
pub const DEFAULT_PATTERNS: &[&str] = &["*.html"];

/// Compile a base-name glob (`*`, `?`) into an anchored regex.
fn pattern_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    match Regex::new(&re) {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "ignoring invalid discovery pattern");
            None
        }
    }
}

/// Recursively find files under `dir` whose base name matches any pattern.
/// Sorted, without duplicates.
pub fn find_files<S: AsRef<str>>(dir: &Path, patterns: &[S]) -> Vec<PathBuf> {
    let matchers: Vec<Regex> = patterns
        .iter()
        .filter_map(|p| pattern_regex(p.as_ref()))
        .collect();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(base) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if matchers.iter().any(|m| m.is_match(base)) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files.dedup();
    files
}

/// Deepest directory containing every path.
pub fn common_dir(paths: &[PathBuf]) -> PathBuf {
    let mut parents = paths
        .iter()
        .map(|p| p.parent().map(Path::to_path_buf).unwrap_or_default());
    let Some(mut common) = parents.next() else {
        return PathBuf::new();
    };
    for parent in parents {
        while !parent.starts_with(&common) {
            if !common.pop() {
                return PathBuf::new();
            }
        }
    }
    common
}

/// Read files into units named relative to their common directory.
pub fn load_units(paths: &[PathBuf]) -> Result<Vec<SourceUnit>> {
    let mut paths = paths.to_vec();
    paths.sort();
    paths.dedup();
    let root = common_dir(&paths);

    paths.iter().map(|path| read_unit(path, &root)).collect()
}

fn read_unit(path: &Path, root: &Path) -> Result<SourceUnit> {
    let raw = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rel = path.strip_prefix(root).unwrap_or(path);
    Ok(SourceUnit::new(path, logical_name(rel), raw))
}

/// Discover and load every matching file under `dir`.
pub fn load_dir<S: AsRef<str>>(dir: &Path, patterns: &[S]) -> Result<Vec<SourceUnit>> {
    if !dir.is_dir() {
        return Err(Error::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }
    let files = find_files(dir, patterns);
    tracing::debug!(dir = %dir.display(), count = files.len(), "discovered sources");

    // Names stay relative to `dir` even when every file sits in a subdirectory.
    files.iter().map(|path| read_unit(path, dir)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_pattern_regex() {
        let re = pattern_regex("*.html").unwrap();
        assert!(re.is_match("Card.html"));
        assert!(!re.is_match("Card.html.bak"));
        assert!(!re.is_match("Cardxhtml"));
        assert!(pattern_regex("page?.tpl").unwrap().is_match("page1.tpl"));
    }

    #[test]
    fn test_find_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pages/Home.html", "home");
        write(dir.path(), "components/Card.html", "card");
        write(dir.path(), "notes.txt", "skip");

        let files = find_files(dir.path(), DEFAULT_PATTERNS);
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("components/Card.html"),
                PathBuf::from("pages/Home.html")
            ]
        );
    }

    #[test]
    fn test_overlapping_patterns_do_not_duplicate() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "Card.html", "card");
        let files = find_files(dir.path(), &["*.html", "Card.*"]);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_common_dir() {
        let paths = vec![
            PathBuf::from("/site/templates/pages/Home.html"),
            PathBuf::from("/site/templates/components/Card.html"),
        ];
        assert_eq!(common_dir(&paths), PathBuf::from("/site/templates"));
        assert_eq!(
            common_dir(&[PathBuf::from("/a/b/C.html")]),
            PathBuf::from("/a/b")
        );
        assert_eq!(common_dir(&[]), PathBuf::new());
    }

    #[test]
    fn test_load_units_logical_names() {
        let dir = TempDir::new().unwrap();
        let home = write(dir.path(), "pages/Home.html", "<p>home</p>");
        let card = write(dir.path(), "components/Card.html", "<div></div>");

        let units = load_units(&[home, card]).unwrap();
        let names: Vec<_> = units.iter().map(|u| u.logical_name.as_str()).collect();
        assert_eq!(names, vec!["components.Card", "pages.Home"]);
        assert_eq!(units[1].raw, "<p>home</p>");
    }

    #[test]
    fn test_load_units_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load_units(&[dir.path().join("nope.html")]).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_load_dir_names_relative_to_root() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pages/Home.html", "home");
        let units = load_dir(dir.path(), DEFAULT_PATTERNS).unwrap();
        assert_eq!(units[0].logical_name, "pages.Home");
    }
}
