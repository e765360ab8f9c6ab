//! Component registry.
//!
//! Decides which capitalized tags are component invocations. Built once per
//! compilation pass, then handed to the matcher by shared reference.

use std::collections::HashSet;

use crate::source::SourceUnit;
use crate::transpile::declared_components;

/// Tag name of the default slot-content placeholder. Always registered.
pub const RESERVED_SLOT: &str = "slot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRegistry {
    names: HashSet<String>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        let mut names = HashSet::new();
        names.insert(RESERVED_SLOT.to_string());
        Self { names }
    }

    /// Idempotent insert.
    pub fn register(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Scan every unit: explicitly declared components are registered under
    /// their declared names, other units under their logical name.
    pub fn build_from_units(units: &[SourceUnit]) -> Self {
        let mut registry = Self::new();
        for unit in units {
            let declared = declared_components(&unit.raw);
            if declared.is_empty() {
                registry.register(unit.logical_name.clone());
            } else {
                for name in declared {
                    registry.register(name);
                }
            }
        }
        registry
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
