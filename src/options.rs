//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::discovery::DEFAULT_PATTERNS;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    /// Run per-unit diagnostics before compiling and log the generated IR.
    pub debug: bool,
    /// Base-name glob patterns used by directory discovery.
    pub patterns: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debug: false,
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl EngineOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_defaults() {
        let options = EngineOptions::default();
        assert!(!options.debug);
        assert_eq!(options.patterns, vec!["*.html"]);
    }

    #[test]
    fn test_from_json_partial() {
        let options = EngineOptions::from_json(r#"{"debug": true}"#).unwrap();
        assert!(options.debug);
        assert_eq!(options.patterns, vec!["*.html"]);

        let options = EngineOptions::from_json(r#"{"patterns": ["*.tpl", "*.gohtml"]}"#).unwrap();
        assert_eq!(options.patterns, vec!["*.tpl", "*.gohtml"]);
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        let err = EngineOptions::from_json(r#"{"debug": "yes"}"#).unwrap_err();
        assert!(matches!(err, Error::Options(_)));
    }
}
