//! Per-unit diagnostics.
//!
//! Compiles each unit on its own so a failing definition can be reported with
//! its location. Structural recoveries are reported the same way, since the
//! verbatim fallback compiles and would otherwise go unnoticed.

use std::fmt;

use crate::error::Recovery;
use crate::ir::split_definitions;
use crate::registry::ComponentRegistry;
use crate::runtime::BaseNamespace;
use crate::source::SourceUnit;
use crate::transpile::transpile_unit;

/// Lines of context shown on each side of the failing line.
const CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub unit: String,
    pub definition: String,
    /// 1-based line within the definition body, when known.
    pub line: Option<usize>,
    pub message: String,
    pub excerpt: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} ({}:{}): {}", self.definition, self.unit, line, self.message)?,
            None => write!(f, "{} ({}): {}", self.definition, self.unit, self.message)?,
        }
        if !self.excerpt.is_empty() {
            write!(f, "\n{}", self.excerpt)?;
        }
        Ok(())
    }
}

/// Lines around `line` (1-based), the failing one marked with `▶`.
pub fn excerpt(body: &str, line: usize) -> String {
    let lines: Vec<&str> = body.lines().collect();
    if line == 0 || line > lines.len() {
        return String::new();
    }
    let first = line.saturating_sub(CONTEXT_LINES).max(1);
    let last = (line + CONTEXT_LINES).min(lines.len());

    (first..=last)
        .map(|n| {
            let marker = if n == line { "▶" } else { " " };
            format!("{} {:>4} | {}", marker, n, lines[n - 1])
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compile every unit individually against `registry`.
///
/// Reports definitions the runtime rejects, bodies kept verbatim after a
/// structural failure, and IR text that does not split back into the
/// definitions it was formatted from.
pub fn check_units(units: &[SourceUnit], registry: &ComponentRegistry) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for unit in units {
        let transpiled = transpile_unit(unit, registry);
        let report = |definition: &str, line: Option<usize>, message: String, body: &str| Diagnostic {
            unit: unit.logical_name.clone(),
            definition: definition.to_string(),
            line,
            message,
            excerpt: line.map(|l| excerpt(body, l)).unwrap_or_default(),
        };

        for recovery in &transpiled.recoveries {
            if let Recovery::Structural { definition, line, .. } = recovery {
                let body = transpiled
                    .definitions
                    .iter()
                    .find(|d| d.name == *definition)
                    .map(|d| d.body.strip_prefix("{% raw %}").unwrap_or(d.body.as_str()))
                    .unwrap_or_default();
                diagnostics.push(report(definition.as_str(), *line, recovery.to_string(), body));
            }
        }

        match split_definitions(&transpiled.ir) {
            Ok(split) if split == transpiled.definitions => {}
            Ok(_) => diagnostics.push(report(
                unit.logical_name.as_str(),
                None,
                "IR text does not split back into its definitions".to_string(),
                "",
            )),
            Err(err) => diagnostics.push(report(unit.logical_name.as_str(), None, err.to_string(), "")),
        }

        let mut env = BaseNamespace::new().environment();
        for definition in &transpiled.definitions {
            if let Err(err) = env.add_template_owned(definition.name.clone(), definition.body.clone()) {
                diagnostics.push(report(
                    definition.name.as_str(),
                    err.line(),
                    err.to_string(),
                    definition.body.as_str(),
                ));
            }
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_excerpt_marks_line() {
        let body = "one\ntwo\nthree\nfour\nfive\nsix";
        assert_eq!(
            excerpt(body, 3),
            "     1 | one\n     2 | two\n▶    3 | three\n     4 | four\n     5 | five"
        );
    }

    #[test]
    fn test_excerpt_clamps_at_edges() {
        let body = "a\nb\nc";
        assert_eq!(excerpt(body, 1), "▶    1 | a\n     2 | b\n     3 | c");
        assert_eq!(excerpt(body, 9), "");
    }

    #[test]
    fn test_check_units_reports_failure() {
        let units = vec![
            SourceUnit::from_relative("ok.html", "<p>{{ Title }}</p>"),
            SourceUnit::from_relative("bad.html", "<p>\n{% if x %}\nopen\n</p>"),
        ];
        let registry = ComponentRegistry::build_from_units(&units);
        let diagnostics = check_units(&units, &registry);

        assert_eq!(diagnostics.len(), 1);
        let d = &diagnostics[0];
        assert_eq!(d.unit, "bad");
        assert_eq!(d.definition, "bad");
        assert!(d.line.is_some());
        assert!(d.excerpt.contains("▶"));
        assert!(!d.excerpt.contains("{% raw %}"));
        assert!(d.message.contains("kept verbatim"));
        assert!(d.to_string().starts_with("bad (bad:"));
    }

    #[test]
    fn test_check_units_reports_unsplittable_ir() {
        let units = vec![SourceUnit::from_relative("a.html", "a\n{% enddefine %}\nb")];
        let registry = ComponentRegistry::build_from_units(&units);
        let diagnostics = check_units(&units, &registry);

        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.definition == "a"));
        assert!(diagnostics[1].line.is_none());
    }

    #[test]
    fn test_check_units_clean() {
        let units = vec![SourceUnit::from_relative("ok.html", "<p>fine</p>")];
        let registry = ComponentRegistry::build_from_units(&units);
        assert!(check_units(&units, &registry).is_empty());
    }
}
