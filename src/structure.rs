//! Structural validation of definition bodies against the template parser.

use minijinja::Environment;
use thiserror::Error;

/// A body the template parser rejects.
#[derive(Debug, Clone, Error)]
#[error("`{name}` does not parse: {message}")]
pub struct StructuralError {
    pub name: String,
    pub line: Option<usize>,
    pub message: String,
}

/// Parse `body` without registering it anywhere.
pub fn check(name: &str, body: &str) -> Result<(), StructuralError> {
    let env = Environment::new();
    env.template_from_str(body)
        .map(|_| ())
        .map_err(|err| StructuralError {
            name: name.to_string(),
            line: err.line(),
            message: err.to_string(),
        })
}
