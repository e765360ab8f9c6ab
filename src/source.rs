//! Source units and logical-name derivation.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Delimiter replacing path separators in logical names.
pub const NAMESPACE_DELIMITER: char = '.';

/// One loaded source file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub logical_name: String,
    pub raw: String,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, logical_name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            logical_name: logical_name.into(),
            raw: raw.into(),
        }
    }

    /// Build a unit from a path already relative to the common root
    /// (`pages/Home.html` → `pages.Home`).
    pub fn from_relative(rel_path: &str, raw: impl Into<String>) -> Self {
        let logical = logical_name(Path::new(rel_path));
        Self::new(rel_path, logical, raw)
    }
}

/// Logical name of a relative path: extension stripped, separators replaced.
pub fn logical_name(rel_path: &Path) -> String {
    let stemmed = rel_path.with_extension("");
    stemmed
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(&NAMESPACE_DELIMITER.to_string())
}

/// Build units from an in-memory map of relative path → source text.
/// Output is ordered by path.
pub fn units_from_sources<I, K, V>(sources: I) -> Vec<SourceUnit>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let ordered: BTreeMap<String, String> = sources
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    ordered
        .into_iter()
        .map(|(path, raw)| SourceUnit::from_relative(&path, raw))
        .collect()
}
