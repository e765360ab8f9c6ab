//! Intermediate representation surface.
//!
//! The IR is plain template text: a sequence of definition blocks
//!
//! ```text
//! {% define "name" %}
//! body
//! {% enddefine %}
//! ```
//!
//! whose bodies use `{{ invoke("name", props) }}` for component invocations.
//! The engine splits the blocks itself and hands each body to the runtime as
//! a named template.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::props::{quote, PropsExpr};

const DEFINE_CLOSE: &str = "\n{% enddefine %}";

lazy_static! {
    static ref DEFINE_OPEN_RE: Regex =
        Regex::new(r#"\{%\s*define\s+("(?:[^"\\]|\\.)*")\s*%\}\n"#).unwrap();
}

/// One named definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub body: String,
}

/// Wrap `body` as a definition block.
pub fn define(name: &str, body: &str) -> String {
    format!("{{% define {} %}}\n{}{}\n", quote(name), body, DEFINE_CLOSE)
}

/// Invocation of `name` with a props expression.
pub fn invocation(name: &str, props: &PropsExpr) -> String {
    format!("{{{{ invoke({}, {}) }}}}", quote(name), props)
}

/// Split concatenated IR into definitions, in order.
///
/// Anything other than whitespace between blocks is malformed.
pub fn split_definitions(ir: &str) -> Result<Vec<Definition>> {
    let mut definitions = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = DEFINE_OPEN_RE.captures_at(ir, cursor) {
        let (Some(open), Some(quoted)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        ensure_blank(&ir[cursor..open.start()], cursor)?;

        let name: String = serde_json::from_str(quoted.as_str()).map_err(|_| {
            Error::MalformedIr(format!("bad definition name {} at {}", quoted.as_str(), open.start()))
        })?;

        let body_start = open.end();
        let close = ir[body_start..].find(DEFINE_CLOSE).ok_or_else(|| {
            Error::MalformedIr(format!("definition `{}` is never closed", name))
        })?;
        definitions.push(Definition {
            name,
            body: ir[body_start..body_start + close].to_string(),
        });
        cursor = body_start + close + DEFINE_CLOSE.len();
    }

    ensure_blank(&ir[cursor..], cursor)?;
    Ok(definitions)
}

fn ensure_blank(text: &str, offset: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let snippet: String = text.trim().chars().take(40).collect();
    Err(Error::MalformedIr(format!(
        "text outside any definition at {}: {:?}",
        offset, snippet
    )))
}
