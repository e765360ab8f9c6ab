//! Error types for the transpiler and the composition engine.
//!
//! Failures split in two families: [`Error`] is surfaced to the caller
//! (compilation, missing pages, I/O), while [`Recovery`] records the local
//! recoveries the transpiler performs without aborting the pass.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The concatenated IR could not be split into definitions.
    #[error("malformed intermediate representation: {0}")]
    MalformedIr(String),

    /// A definition was rejected by the template runtime. Fatal for the pass.
    /// Bodies are checked and wrapped during transpilation, so this only
    /// fires when the runtime and the structural check disagree.
    #[error("failed to compile definition `{name}`: {source}")]
    Compile {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("no definition named `{0}`")]
    MissingDefinition(String),

    #[error("failed to render `{name}`: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("invalid engine options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("failed to write rendered output: {0}")]
    Write(#[source] std::io::Error),
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCAL RECOVERIES
// ═══════════════════════════════════════════════════════════════════════════════

/// A failure the transpiler recovered from locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// A registered tag had no depth-zero close; its text was left untouched.
    UnmatchedTag { tag: String, offset: usize },
    /// The rewritten body was rejected by the template parser; the raw body
    /// was emitted verbatim instead. `line` is set when the owner body itself
    /// failed, counted within that body.
    Structural {
        definition: String,
        line: Option<usize>,
        message: String,
    },
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::UnmatchedTag { tag, offset } => {
                write!(f, "unclosed <{}> at byte {}, left as literal markup", tag, offset)
            }
            Recovery::Structural {
                definition,
                message,
                ..
            } => write!(
                f,
                "definition `{}` kept verbatim after structural failure: {}",
                definition, message
            ),
        }
    }
}
