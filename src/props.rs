//! Prop resolution: attribute spans → props expressions.
//!
//! Attributes are read in source order. Literal attributes become entries of a
//! `dict(...)` call, `{...expr}` spreads become `merge(...)` arguments folded
//! to the right, so that later arguments (and literal entries, always last)
//! win on key conflicts.

use std::fmt;

/// Reserved variable holding the whole current data value inside every
/// execution context.
pub const CONTEXT_VAR: &str = "__ctx";

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Quoted or bare text, possibly with `{{ expr }}` interpolations.
    Text(String),
    /// `key={expr}`
    Expr(String),
    /// Bare `key`.
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    Literal { key: String, value: AttrValue },
    Spread(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPS EXPRESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Props expression of one invocation. Renders as exactly one of a `dict`
/// call, a bare spread, or a right-nested `merge` fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropsExpr {
    pub spreads: Vec<String>,
    /// `(key, expression)` pairs in source order.
    pub entries: Vec<(String, String)>,
}

impl PropsExpr {
    /// Append entries after the literal ones; they override on conflict.
    pub fn with_entries(mut self, extra: impl IntoIterator<Item = (String, String)>) -> Self {
        self.entries.extend(extra);
        self
    }

    fn write_dict(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dict(")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}, {}", quote(key), value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for PropsExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.spreads.is_empty() {
            return self.write_dict(f);
        }
        if self.entries.is_empty() && self.spreads.len() == 1 {
            return write!(f, "{}", self.spreads[0]);
        }

        // merge(s1, merge(s2, ..., innermost))
        let (outer, innermost_spread) = if self.entries.is_empty() {
            (&self.spreads[..self.spreads.len() - 1], self.spreads.last())
        } else {
            (&self.spreads[..], None)
        };
        for spread in outer {
            write!(f, "merge({}, ", spread)?;
        }
        match innermost_spread {
            Some(spread) => write!(f, "{}", spread)?,
            None => self.write_dict(f)?,
        }
        for _ in outer {
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// Resolve an invocation's attribute span into its props expression.
pub fn resolve_props(attr_text: &str) -> PropsExpr {
    let mut props = PropsExpr::default();
    for attr in parse_attributes(attr_text) {
        match attr {
            Attribute::Spread(expr) => props.spreads.push(expr),
            Attribute::Literal { key, value } => {
                let expr = value_expr(&value);
                props.entries.push((key, expr));
            }
        }
    }
    props
}

/// Quote a string as a template string literal.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.escape_default()))
}

/// Expression for one attribute value.
pub fn value_expr(value: &AttrValue) -> String {
    match value {
        AttrValue::Flag => "true".to_string(),
        AttrValue::Expr(expr) => format!("({})", expr.trim()),
        AttrValue::Text(text) => interpolate(text),
    }
}

/// Turn text with `{{ expr }}` interpolations into a concatenation. A value
/// that is exactly one interpolation keeps the expression's own value.
fn interpolate(text: &str) -> String {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            parts.push(quote(&rest[..open]));
        }
        let inner = &rest[open + 2..open + 2 + close];
        let inner = inner.strip_prefix('-').unwrap_or(inner);
        let inner = inner.strip_suffix('-').unwrap_or(inner);
        parts.push(format!("({})", inner.trim()));
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() || parts.is_empty() {
        parts.push(quote(rest));
    }

    if parts.len() == 1 {
        parts.remove(0)
    } else {
        format!("({})", parts.join(" ~ "))
    }
}

/// Normalize a spread operand: a leading `.` is accepted, and an empty or
/// bare `.` operand means the whole current context.
fn spread_expr(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return CONTEXT_VAR.to_string();
    }
    trimmed.strip_prefix('.').unwrap_or(trimmed).trim().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTE SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Find the end of a balanced brace expression, handling strings.
/// Returns the index after the closing brace, or None if unbalanced.
fn find_balanced_brace_end(text: &str, start_index: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0;
    let mut i = start_index;
    let mut in_string: Option<u8> = None;

    while i < bytes.len() {
        let c = bytes[i];

        // Handle escape sequences
        if c == b'\\' && i + 1 < bytes.len() {
            i += 2;
            continue;
        }

        if let Some(q) = in_string {
            if c == q {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if c == b'"' || c == b'\'' {
            in_string = Some(c);
            i += 1;
            continue;
        }

        if c == b'{' {
            depth += 1;
        } else if c == b'}' {
            depth -= 1;
            if depth == 0 {
                return Some(i + 1);
            }
        }

        i += 1;
    }

    None
}

fn is_key_byte(c: u8) -> bool {
    !c.is_ascii_whitespace() && !matches!(c, b'=' | b'>' | b'/' | b'"' | b'\'' | b'{' | b'}')
}

/// Parse an attribute span into attributes, in source order.
/// Unrecognized bytes are skipped.
pub fn parse_attributes(attr_text: &str) -> Vec<Attribute> {
    let bytes = attr_text.as_bytes();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() || c == b'/' {
            i += 1;
            continue;
        }

        // {...expr}
        if c == b'{' {
            match find_balanced_brace_end(attr_text, i) {
                Some(end) => {
                    let inner = &attr_text[i + 1..end - 1];
                    if let Some(operand) = inner.trim_start().strip_prefix("...") {
                        attrs.push(Attribute::Spread(spread_expr(operand)));
                    }
                    i = end;
                }
                None => break,
            }
            continue;
        }

        if !is_key_byte(c) {
            i += 1;
            continue;
        }

        let key_start = i;
        while i < bytes.len() && is_key_byte(bytes[i]) {
            i += 1;
        }
        let key = attr_text[key_start..i].to_string();

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes.get(j) != Some(&b'=') {
            attrs.push(Attribute::Literal {
                key,
                value: AttrValue::Flag,
            });
            continue;
        }
        j += 1;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }

        let value = match bytes.get(j) {
            Some(&q) if q == b'"' || q == b'\'' => {
                let close = attr_text[j + 1..]
                    .find(q as char)
                    .map(|p| j + 1 + p)
                    .unwrap_or(bytes.len());
                let text = attr_text[j + 1..close].to_string();
                i = (close + 1).min(bytes.len());
                AttrValue::Text(text)
            }
            Some(b'{') if bytes.get(j + 1) == Some(&b'{') => {
                let end = crate::matcher::skip_template_block(bytes, j).unwrap_or(bytes.len());
                i = end;
                AttrValue::Text(attr_text[j..end].to_string())
            }
            Some(b'{') => match find_balanced_brace_end(attr_text, j) {
                Some(end) => {
                    i = end;
                    AttrValue::Expr(attr_text[j + 1..end - 1].to_string())
                }
                None => {
                    i = bytes.len();
                    AttrValue::Text(attr_text[j..].to_string())
                }
            },
            Some(_) => {
                let start = j;
                while j < bytes.len() && !bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                i = j;
                AttrValue::Text(attr_text[start..j].to_string())
            }
            None => {
                i = j;
                AttrValue::Text(String::new())
            }
        };

        attrs.push(Attribute::Literal { key, value });
    }

    attrs
}

/// Static text value of the attribute `key`, if present.
pub fn static_attribute(attrs: &[Attribute], key: &str) -> Option<String> {
    attrs.iter().find_map(|a| match a {
        Attribute::Literal {
            key: k,
            value: AttrValue::Text(v),
        } if k == key => Some(v.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_balanced_brace() {
        assert_eq!(find_balanced_brace_end("{hello}", 0), Some(7));
        assert_eq!(find_balanced_brace_end("{...a}", 0), Some(6));
        assert_eq!(find_balanced_brace_end("{'string with { brace'}", 0), Some(23));
        assert_eq!(find_balanced_brace_end("{open", 0), None);
    }

    #[test]
    fn test_parse_attribute_forms() {
        let attrs = parse_attributes(r#" Title="Hola" {...Base} disabled Size=3 Count={n + 1} Alt='x'"#);
        assert_eq!(
            attrs,
            vec![
                Attribute::Literal {
                    key: "Title".into(),
                    value: AttrValue::Text("Hola".into())
                },
                Attribute::Spread("Base".into()),
                Attribute::Literal {
                    key: "disabled".into(),
                    value: AttrValue::Flag
                },
                Attribute::Literal {
                    key: "Size".into(),
                    value: AttrValue::Text("3".into())
                },
                Attribute::Literal {
                    key: "Count".into(),
                    value: AttrValue::Expr("n + 1".into())
                },
                Attribute::Literal {
                    key: "Alt".into(),
                    value: AttrValue::Text("x".into())
                },
            ]
        );
    }

    #[test]
    fn test_dict_shape_keys_in_source_order() {
        let props = resolve_props(r#" B="2" A="1""#);
        assert_eq!(props.to_string(), r#"dict("B", "2", "A", "1")"#);
    }

    #[test]
    fn test_empty_attributes() {
        assert_eq!(resolve_props("").to_string(), "dict()");
        assert_eq!(resolve_props("   ").to_string(), "dict()");
    }

    #[test]
    fn test_single_spread_alone() {
        assert_eq!(resolve_props(" {...Base}").to_string(), "Base");
        assert_eq!(resolve_props(" {... .Base}").to_string(), "Base");
        assert_eq!(resolve_props(" {...user.profile}").to_string(), "user.profile");
    }

    #[test]
    fn test_whole_context_spread() {
        assert_eq!(resolve_props(" {...}").to_string(), CONTEXT_VAR);
        assert_eq!(resolve_props(" {....}").to_string(), CONTEXT_VAR);
    }

    #[test]
    fn test_literal_overrides_spread_regardless_of_order() {
        let before = resolve_props(r#" Name="X" {...Base}"#).to_string();
        let after = resolve_props(r#" {...Base} Name="X""#).to_string();
        assert_eq!(before, r#"merge(Base, dict("Name", "X"))"#);
        assert_eq!(before, after);
    }

    #[test]
    fn test_multiple_spreads_fold_left_to_right() {
        let props = resolve_props(r#" {...A} {...B} K="v""#);
        assert_eq!(props.to_string(), r#"merge(A, merge(B, dict("K", "v")))"#);

        let spreads_only = resolve_props(" {...A} {...B} {...C}");
        assert_eq!(spreads_only.to_string(), "merge(A, merge(B, C))");
    }

    #[test]
    fn test_extra_entries_come_last() {
        let props = resolve_props(r#" {...A} Slot="lit""#)
            .with_entries(vec![("Slot".to_string(), "\"slot\"".to_string())]);
        assert_eq!(
            props.to_string(),
            r#"merge(A, dict("Slot", "lit", "Slot", "slot"))"#
        );
    }

    #[test]
    fn test_interpolated_values() {
        assert_eq!(value_expr(&AttrValue::Text("{{ kind }}".into())), "(kind)");
        assert_eq!(
            value_expr(&AttrValue::Text("btn-{{ kind }} big".into())),
            r#"("btn-" ~ (kind) ~ " big")"#
        );
        assert_eq!(value_expr(&AttrValue::Text("say \"hi\"".into())), r#""say \"hi\"""#);
        assert_eq!(value_expr(&AttrValue::Text(String::new())), r#""""#);
    }

    #[test]
    fn test_unquoted_template_value() {
        let attrs = parse_attributes(" Count={{ n }} x");
        assert_eq!(
            attrs[0],
            Attribute::Literal {
                key: "Count".into(),
                value: AttrValue::Text("{{ n }}".into())
            }
        );
        assert_eq!(resolve_props(" Count={{ n }}").to_string(), r#"dict("Count", (n))"#);
    }

    #[test]
    fn test_static_attribute() {
        let attrs = parse_attributes(r#" name="Footer" class="x""#);
        assert_eq!(static_attribute(&attrs, "name"), Some("Footer".to_string()));
        assert_eq!(static_attribute(&attrs, "id"), None);
    }
}
