//! Transpiler: one source unit → IR text.
//!
//! Per definition body:
//!
//! 1. `{% slot %}` placeholders are rewritten into guarded invocations.
//! 2. Self-closing invocations are replaced.
//! 3. Paired invocations are replaced, inner text first, with their slot
//!    content extracted into generated definitions.
//! 4. The result is checked against the template parser. A rejected body is
//!    emitted verbatim inside a raw block, so it still compiles and renders
//!    as its own text, and the pass moves on.
//!
//! Output order is every generated slot definition followed by the owner's
//! definition, so a referenced slot name always ships in the same batch.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::Recovery;
use crate::ir::{define, invocation, Definition};
use crate::matcher::{scan_components, Scan};
use crate::props::{quote, resolve_props};
use crate::registry::ComponentRegistry;
use crate::slots::{
    placeholder, placeholder_with_fallback, resolve_slots, slot_label, SlotContext, SlotUnit,
    DEFAULT_SLOT_KEY,
};
use crate::source::SourceUnit;
use crate::structure;

lazy_static! {
    static ref COMPONENT_BLOCK_RE: Regex = Regex::new(
        r"(?s)\{%-?\s*component\s+([\p{L}_][\w.\-]*)\s*-?%\}(.*?)\{%-?\s*endcomponent\s*-?%\}"
    )
    .unwrap();
    static ref SLOT_MARKER_RE: Regex =
        Regex::new(r#"\{%-?\s*slot(?:\s+name\s*=\s*(?:"([^"]*)"|'([^']*)'))?\s*-?%\}"#).unwrap();
    static ref END_SLOT_RE: Regex = Regex::new(r"\{%-?\s*endslot\s*-?%\}").unwrap();
    static ref END_RAW_RE: Regex = Regex::new(r"\{%[-+]?\s*endraw\s*[-+]?%\}").unwrap();
}

/// Result of transpiling one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transpiled {
    pub ir: String,
    /// The definitions `ir` was formatted from, in IR order.
    pub definitions: Vec<Definition>,
    pub recoveries: Vec<Recovery>,
}

impl Transpiled {
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    fn push(&mut self, name: String, body: String) {
        self.ir.push_str(&define(&name, &body));
        self.definitions.push(Definition { name, body });
    }
}

/// Component names declared with `{% component Name %}` in `raw`.
pub fn declared_components(raw: &str) -> Vec<String> {
    COMPONENT_BLOCK_RE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Transpile a unit to IR text.
pub fn transpile(unit: &SourceUnit, registry: &ComponentRegistry) -> String {
    transpile_unit(unit, registry).ir
}

/// Transpile a unit, also reporting the local recoveries performed.
pub fn transpile_unit(unit: &SourceUnit, registry: &ComponentRegistry) -> Transpiled {
    let mut rewriter = Rewriter {
        registry,
        slots: SlotContext::new(unit.logical_name.clone()),
        units: Vec::new(),
        recoveries: Vec::new(),
    };
    let mut out = Transpiled::default();

    for (name, body) in definition_blocks(unit) {
        let (units, owner_body) = rewriter.definition(&name, body);
        for slot in units {
            out.push(slot.name, slot.body);
        }
        out.push(name, owner_body);
    }

    for recovery in &rewriter.recoveries {
        tracing::warn!(unit = %unit.logical_name, "{}", recovery);
    }
    out.recoveries = rewriter.recoveries;
    out
}

/// `(definition name, raw body)` pairs of a unit.
fn definition_blocks(unit: &SourceUnit) -> Vec<(String, &str)> {
    let blocks: Vec<(String, &str)> = COMPONENT_BLOCK_RE
        .captures_iter(&unit.raw)
        .filter_map(|caps| Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str())))
        .collect();

    if blocks.is_empty() {
        return vec![(unit.logical_name.clone(), unit.raw.as_str())];
    }

    let outside = COMPONENT_BLOCK_RE.replace_all(&unit.raw, "");
    if !outside.trim().is_empty() {
        tracing::debug!(
            unit = %unit.logical_name,
            "ignoring text outside component blocks"
        );
    }
    blocks
}

/// Rewrite definer-side slot placeholders.
///
/// A marker followed by `{% endslot %}` before the next marker is the block
/// form and carries fallback content.
pub fn rewrite_slot_placeholders(body: &str) -> String {
    let markers: Vec<_> = SLOT_MARKER_RE.captures_iter(body).collect();
    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;

    for (idx, caps) in markers.iter().enumerate() {
        let Some(marker) = caps.get(0) else {
            continue;
        };
        if marker.start() < cursor {
            continue;
        }
        out.push_str(&body[cursor..marker.start()]);

        let label = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|n| slot_label(n.as_str()))
            .unwrap_or_else(|| DEFAULT_SLOT_KEY.to_string());
        let next_marker = markers
            .get(idx + 1)
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(body.len());

        match END_SLOT_RE.find_at(body, marker.end()) {
            Some(end) if end.start() < next_marker => {
                out.push_str(&placeholder_with_fallback(
                    &label,
                    &body[marker.end()..end.start()],
                ));
                cursor = end.end();
            }
            _ => {
                out.push_str(&placeholder(&label));
                cursor = marker.end();
            }
        }
    }

    out.push_str(&body[cursor..]);
    out
}

/// `raw` wrapped so the template parser always accepts it and rendering
/// yields the text unchanged. Inner `endraw` tags are re-emitted as string
/// expressions.
pub fn verbatim(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 24);
    out.push_str("{% raw %}");
    let mut cursor = 0;
    for m in END_RAW_RE.find_iter(raw) {
        out.push_str(&raw[cursor..m.start()]);
        out.push_str("{% endraw %}{{ ");
        out.push_str(&quote(m.as_str()));
        out.push_str(" }}{% raw %}");
        cursor = m.end();
    }
    out.push_str(&raw[cursor..]);
    out.push_str("{% endraw %}");
    out
}

struct Rewriter<'a> {
    registry: &'a ComponentRegistry,
    slots: SlotContext,
    units: Vec<SlotUnit>,
    recoveries: Vec<Recovery>,
}

impl<'a> Rewriter<'a> {
    /// Rewrite one definition body. Returns the slot units it produced and the
    /// final owner body.
    fn definition(&mut self, name: &str, raw: &str) -> (Vec<SlotUnit>, String) {
        let placeholders = rewrite_slot_placeholders(raw);
        let self_closed = self.rewrite_self_closing(&placeholders);
        let body = self.rewrite_paired(&self_closed);
        let units = std::mem::take(&mut self.units);

        let checked = structure::check(name, &body).and_then(|_| {
            units
                .iter()
                .try_for_each(|unit| structure::check(&unit.name, &unit.body))
        });

        match checked {
            Ok(()) => (units, body),
            Err(err) => {
                self.recoveries.push(Recovery::Structural {
                    definition: name.to_string(),
                    line: err.line.filter(|_| err.name == name),
                    message: err.to_string(),
                });
                (Vec::new(), verbatim(raw))
            }
        }
    }

    /// First pass: every self-closing invocation, at any depth.
    fn rewrite_self_closing(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        let mut scan_from = 0;

        loop {
            match scan_components(text, scan_from, self.registry) {
                Scan::Found(m) if m.is_self_closing() => {
                    out.push_str(&text[cursor..m.start]);
                    out.push_str(&invocation(&m.name, &resolve_props(m.attrs(text))));
                    cursor = m.end;
                    scan_from = m.end;
                }
                // Step inside paired tags; their bodies may hold self-closing ones.
                Scan::Found(m) => scan_from = m.attrs.end + 1,
                Scan::Unmatched { resume, .. } => scan_from = resume,
                Scan::Done => break,
            }
        }

        out.push_str(&text[cursor..]);
        out
    }

    /// Second pass: paired invocations, inner text first.
    fn rewrite_paired(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;

        loop {
            match scan_components(text, cursor, self.registry) {
                Scan::Found(m) => {
                    out.push_str(&text[cursor..m.start]);
                    let props = resolve_props(m.attrs(text));
                    let props = if m.is_self_closing() {
                        props
                    } else {
                        let inner = self.rewrite_paired(m.body(text));
                        let resolved = resolve_slots(&inner, &m.name, &mut self.slots);
                        let entries = resolved.prop_entries();
                        self.units.extend(resolved.units);
                        props.with_entries(entries)
                    };
                    out.push_str(&invocation(&m.name, &props));
                    cursor = m.end;
                }
                Scan::Unmatched { name, start, resume } => {
                    self.recoveries.push(Recovery::UnmatchedTag {
                        tag: name,
                        offset: start,
                    });
                    out.push_str(&text[cursor..resume]);
                    cursor = resume;
                }
                Scan::Done => break,
            }
        }

        out.push_str(&text[cursor..]);
        out
    }
}
