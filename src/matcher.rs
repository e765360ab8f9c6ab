//! Nested Tag Matcher
//!
//! Cursor-driven scanner that finds custom-tag invocations in raw source text.
//! The scanner moves through four states (text, open-tag name, attributes,
//! close matching) over a byte cursor. Every delimiter it looks for is ASCII,
//! so all offsets it produces are valid `str` boundaries.
//!
//! Template blocks (`{{ }}`, `{% %}`, `{# #}`) are opaque in every state: a
//! `<` inside an expression never opens a tag and a `>` inside one never
//! closes it.

use std::ops::Range;

use crate::registry::ComponentRegistry;

/// A located tag invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagMatch {
    pub name: String,
    /// Offset of the opening `<`.
    pub start: usize,
    /// Offset just past the final `>` (of the close tag for paired shapes).
    pub end: usize,
    /// Attribute span, excluding the name and the trailing `/` of a
    /// self-closing tag.
    pub attrs: Range<usize>,
    /// Body span for paired tags; `None` for self-closing ones.
    pub body: Option<Range<usize>>,
}

impl TagMatch {
    pub fn is_self_closing(&self) -> bool {
        self.body.is_none()
    }

    pub fn attrs<'a>(&self, text: &'a str) -> &'a str {
        &text[self.attrs.clone()]
    }

    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        match &self.body {
            Some(range) => &text[range.clone()],
            None => "",
        }
    }
}

/// Outcome of one scan step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    Found(TagMatch),
    /// Open tag without a depth-zero close. Scanning may resume at `resume`.
    Unmatched {
        name: String,
        start: usize,
        resume: usize,
    },
    Done,
}

/// Find the next registered component invocation at or after `from`.
/// Unclosed tags are skipped over.
pub fn find_next_invocation(
    text: &str,
    from: usize,
    registry: &ComponentRegistry,
) -> Option<TagMatch> {
    let mut cursor = from;
    loop {
        match scan_components(text, cursor, registry) {
            Scan::Found(m) => return Some(m),
            Scan::Unmatched { resume, .. } => cursor = resume,
            Scan::Done => return None,
        }
    }
}

/// One scan step for registered, uppercase-led component tags.
pub fn scan_components(text: &str, from: usize, registry: &ComponentRegistry) -> Scan {
    scan_elements(text, from, |name| {
        is_component_tag(name) && registry.is_registered(name)
    })
}

/// Check if a tag name represents a component (starts with uppercase)
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
}

/// One scan step for any element whose name satisfies `accept`.
pub fn scan_elements<F>(text: &str, from: usize, accept: F) -> Scan
where
    F: Fn(&str) -> bool,
{
    let bytes = text.as_bytes();
    let mut i = from;

    // Scanning text
    while i < bytes.len() {
        if let Some(end) = skip_template_block(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        // Inside open tag: read the name
        let name_start = i + 1;
        let name_end = read_tag_name(bytes, name_start);
        if name_end == name_start || !is_tag_boundary(bytes, name_end) {
            i += 1;
            continue;
        }
        let name = &text[name_start..name_end];
        if !accept(name) {
            i = name_end;
            continue;
        }

        // Inside attributes
        let Some(gt) = find_tag_end(bytes, name_end) else {
            return Scan::Unmatched {
                name: name.to_string(),
                start: i,
                resume: name_end,
            };
        };

        if is_self_closing(bytes, name_end, gt) {
            let slash = last_non_space(bytes, name_end, gt);
            return Scan::Found(TagMatch {
                name: name.to_string(),
                start: i,
                end: gt + 1,
                attrs: name_end..slash,
                body: None,
            });
        }

        // Matching close
        return match find_matching_close(text, gt + 1, name) {
            Some((close_start, close_end)) => Scan::Found(TagMatch {
                name: name.to_string(),
                start: i,
                end: close_end,
                attrs: name_end..gt,
                body: Some(gt + 1..close_start),
            }),
            None => Scan::Unmatched {
                name: name.to_string(),
                start: i,
                resume: gt + 1,
            },
        };
    }

    Scan::Done
}

/// Returns the offset just past a template block starting at `i`, if any.
/// String literals inside expression and statement blocks are honored, so a
/// quoted `}}` does not end the block. An unterminated block swallows the
/// rest of the input.
pub fn skip_template_block(bytes: &[u8], i: usize) -> Option<usize> {
    if bytes.get(i) != Some(&b'{') {
        return None;
    }
    let closer: &[u8] = match bytes.get(i + 1) {
        Some(b'{') => b"}}",
        Some(b'%') => b"%}",
        Some(b'#') => b"#}",
        _ => return None,
    };
    let is_code = closer != b"#}";
    let mut j = i + 2;
    let mut quote: Option<u8> = None;

    while j < bytes.len() {
        let c = bytes[j];
        if let Some(q) = quote {
            if c == b'\\' {
                j += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            j += 1;
            continue;
        }
        if is_code && (c == b'"' || c == b'\'') {
            quote = Some(c);
        } else if bytes[j..].starts_with(closer) {
            return Some(j + 2);
        }
        j += 1;
    }

    Some(bytes.len())
}

/// End of the tag name at `start`. Bytes of multi-byte characters count as
/// name bytes, so the end always falls on a char boundary.
fn read_tag_name(bytes: &[u8], start: usize) -> usize {
    let mut j = start;
    if !bytes
        .get(j)
        .map(|b| b.is_ascii_alphabetic() || !b.is_ascii())
        .unwrap_or(false)
    {
        return start;
    }
    while j < bytes.len()
        && (bytes[j].is_ascii_alphanumeric()
            || !bytes[j].is_ascii()
            || matches!(bytes[j], b'_' | b'.' | b'-' | b':'))
    {
        j += 1;
    }
    j
}

fn is_tag_boundary(bytes: &[u8], i: usize) -> bool {
    match bytes.get(i) {
        Some(b) => b.is_ascii_whitespace() || *b == b'>' || *b == b'/',
        None => false,
    }
}

/// Find the `>` closing an open tag whose attribute span starts at `from`.
/// Quotes, template blocks and `{...}` braces are honored.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    let mut quote: Option<u8> = None;
    let mut brace_depth = 0usize;

    while i < bytes.len() {
        let c = bytes[i];

        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if let Some(end) = skip_template_block(bytes, i) {
            i = end;
            continue;
        }

        match c {
            b'"' | b'\'' => quote = Some(c),
            b'{' => brace_depth += 1,
            b'}' => brace_depth = brace_depth.saturating_sub(1),
            b'>' if brace_depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }

    None
}

fn last_non_space(bytes: &[u8], from: usize, to: usize) -> usize {
    let mut j = to;
    while j > from && bytes[j - 1].is_ascii_whitespace() {
        j -= 1;
    }
    j.saturating_sub(1).max(from)
}

fn is_self_closing(bytes: &[u8], from: usize, gt: usize) -> bool {
    let slash = last_non_space(bytes, from, gt);
    slash < gt && bytes[slash] == b'/' && slash >= from
}

/// Depth-counting search for the close tag matching an open `name` whose body
/// starts at `from`. Returns `(close_start, close_end)`.
///
/// Only tags with the same name move the counter; a nested self-closing tag
/// of the same name is balanced on its own and leaves it untouched.
fn find_matching_close(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let name_bytes = name.as_bytes();
    let mut depth = 1usize;
    let mut i = from;

    while i < bytes.len() {
        if let Some(end) = skip_template_block(bytes, i) {
            i = end;
            continue;
        }
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        // </Name>
        if bytes.get(i + 1) == Some(&b'/') && bytes[i + 2..].starts_with(name_bytes) {
            let mut j = i + 2 + name_bytes.len();
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if bytes.get(j) == Some(&b'>') {
                depth -= 1;
                if depth == 0 {
                    return Some((i, j + 1));
                }
                i = j + 1;
                continue;
            }
        }

        // <Name ...>
        if bytes[i + 1..].starts_with(name_bytes) {
            let name_end = i + 1 + name_bytes.len();
            if is_tag_boundary(bytes, name_end) {
                if let Some(gt) = find_tag_end(bytes, name_end) {
                    if !is_self_closing(bytes, name_end, gt) {
                        depth += 1;
                    }
                    i = gt + 1;
                    continue;
                }
            }
        }

        i += 1;
    }

    None
}
