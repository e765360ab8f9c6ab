//! Markup normalization.
//!
//! Parses rendered output with html5ever and serializes it back in a canonical
//! form: attributes sorted, text whitespace-collapsed and trimmed, comments
//! dropped. Two fragments that normalize to the same string are treated as
//! equivalent markup.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Canonical serialization of `html`. The implied `html`/`head`/`body`
/// wrappers are flattened unless the input carries its own `<html>`.
pub fn normalize(html: &str) -> String {
    let dom = match parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(err) => {
            tracing::debug!(error = %err, "markup parse failed, comparing raw text");
            return collapse_whitespace(html);
        }
    };

    let keep_wrappers = html.to_lowercase().contains("<html");
    let mut out = String::new();
    for child in dom.document.children.borrow().iter() {
        write_node(child, keep_wrappers, &mut out);
    }
    out
}

/// Visible text of `html`, whitespace-collapsed.
pub fn text_content(html: &str) -> String {
    let Ok(dom) = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    else {
        return collapse_whitespace(html);
    };
    let mut raw = String::new();
    collect_text(&dom.document, &mut raw);
    collapse_whitespace(&raw)
}

/// True when both fragments normalize to the same markup.
pub fn equivalent(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn write_node(handle: &Handle, keep_wrappers: bool, out: &mut String) {
    match &handle.data {
        NodeData::Document => {
            for child in handle.children.borrow().iter() {
                write_node(child, keep_wrappers, out);
            }
        }
        NodeData::Element { name, attrs, .. } => {
            let tag = name.local.to_string();
            let is_wrapper = matches!(tag.as_str(), "html" | "head" | "body");
            if is_wrapper && !keep_wrappers {
                for child in handle.children.borrow().iter() {
                    write_node(child, keep_wrappers, out);
                }
                return;
            }

            let mut pairs: Vec<(String, String)> = attrs
                .borrow()
                .iter()
                .map(|a| (a.name.local.to_string(), a.value.to_string()))
                .collect();
            pairs.sort();

            out.push('<');
            out.push_str(&tag);
            for (key, value) in pairs {
                out.push_str(&format!(" {}=\"{}\"", key, escape(&value)));
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                return;
            }
            for child in handle.children.borrow().iter() {
                write_node(child, keep_wrappers, out);
            }
            out.push_str(&format!("</{}>", tag));
        }
        NodeData::Text { contents } => {
            let text = collapse_whitespace(&contents.borrow());
            if !text.is_empty() {
                out.push_str(&escape(&text));
            }
        }
        NodeData::Doctype { name, .. } => {
            if keep_wrappers {
                out.push_str(&format!("<!DOCTYPE {}>", name));
            }
        }
        NodeData::Comment { .. } | NodeData::ProcessingInstruction { .. } => {}
    }
}

fn collect_text(handle: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &handle.data {
        out.push_str(&contents.borrow());
        out.push(' ');
    }
    for child in handle.children.borrow().iter() {
        collect_text(child, out);
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
