//! Slot resolution.
//!
//! Invoker side: content nested in a paired invocation is split into named
//! slots (`<slot name="Label">…</slot>`) and the default slot (everything
//! else). Each becomes its own generated definition, referenced from the props
//! dictionary through a deferred invocation that runs in the caller's data
//! context only when the component places the slot. The entry is wrapped in
//! `deferred(...)` so the runtime can tell it apart from plain string data.
//!
//! Definer side: `{% slot %}` placeholders become guarded invocations of the
//! definition installed under the slot's key.

use crate::matcher::{scan_elements, Scan};
use crate::props::{parse_attributes, quote, static_attribute, CONTEXT_VAR};
use crate::registry::RESERVED_SLOT;

/// Props key of the default (anonymous) slot.
pub const DEFAULT_SLOT_KEY: &str = "Slot";

/// Props key capturing the caller's data context for deferred slot bodies.
pub const CALLER_VAR: &str = "__caller";

/// A synthesized definition holding extracted slot content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotUnit {
    pub name: String,
    pub body: String,
}

/// Per-unit naming state threaded through slot resolution.
#[derive(Debug, Clone)]
pub struct SlotContext {
    owner: String,
    counter: usize,
}

impl SlotContext {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            counter: 0,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn next_name(&mut self, component: &str, label: &str) -> String {
        let name = format!("{}__{}__{}__{}", self.owner, component, label, self.counter);
        self.counter += 1;
        name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub label: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSlots {
    pub entries: Vec<SlotEntry>,
    pub units: Vec<SlotUnit>,
}

impl ResolvedSlots {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Props entries for the invocation: one `deferred(...)` slot source per
    /// slot, plus the captured caller context.
    pub fn prop_entries(&self) -> Vec<(String, String)> {
        if self.entries.is_empty() {
            return Vec::new();
        }
        let mut entries: Vec<(String, String)> = self
            .entries
            .iter()
            .map(|e| (e.label.clone(), format!("deferred({})", quote(&deferred_invocation(&e.unit)))))
            .collect();
        entries.push((CALLER_VAR.to_string(), CONTEXT_VAR.to_string()));
        entries
    }
}

/// Normalized slot key: first letter uppercased, so the key qualifies for
/// installation as a definition.
pub fn slot_label(name: &str) -> String {
    let mut chars = name.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => DEFAULT_SLOT_KEY.to_string(),
    }
}

/// Source of the deferred invocation stored under a slot key.
pub fn deferred_invocation(unit: &str) -> String {
    format!("{{{{ invoke({}, {}) }}}}", quote(unit), CALLER_VAR)
}

/// Definer-side placeholder for a slot key.
pub fn placeholder(label: &str) -> String {
    let key = quote(label);
    format!(
        "{{{{ invoke({key}, {ctx}) if {ctx}[{key}] is defined }}}}",
        key = key,
        ctx = CONTEXT_VAR
    )
}

/// Definer-side placeholder rendering `fallback` when the key is absent.
pub fn placeholder_with_fallback(label: &str, fallback: &str) -> String {
    let key = quote(label);
    format!(
        "{{% if {ctx}[{key}] is defined %}}{{{{ invoke({key}, {ctx}) }}}}{{% else %}}{fallback}{{% endif %}}",
        key = key,
        ctx = CONTEXT_VAR,
        fallback = fallback
    )
}

/// Split an invocation body into slot units.
///
/// `inner` must already be transpiled, so any `<slot>` left in it belongs to
/// this invocation.
pub fn resolve_slots(inner: &str, component: &str, ctx: &mut SlotContext) -> ResolvedSlots {
    let mut named: Vec<(String, String)> = Vec::new();
    let mut default = String::new();
    let mut cursor = 0;

    loop {
        match scan_elements(inner, cursor, |name| name == RESERVED_SLOT) {
            Scan::Found(m) => {
                default.push_str(&inner[cursor..m.start]);
                let attrs = parse_attributes(m.attrs(inner));
                let label = static_attribute(&attrs, "name")
                    .filter(|n| !n.trim().is_empty())
                    .map(|n| slot_label(&n));
                match label {
                    Some(label) if label != DEFAULT_SLOT_KEY => {
                        match named.iter_mut().find(|(l, _)| *l == label) {
                            Some((_, body)) => body.push_str(m.body(inner)),
                            None => named.push((label, m.body(inner).to_string())),
                        }
                    }
                    _ => default.push_str(m.body(inner)),
                }
                cursor = m.end;
            }
            Scan::Unmatched { resume, .. } => {
                default.push_str(&inner[cursor..resume]);
                cursor = resume;
            }
            Scan::Done => {
                default.push_str(&inner[cursor..]);
                break;
            }
        }
    }

    let mut resolved = ResolvedSlots::default();
    let mut emit = |label: String, body: String, ctx: &mut SlotContext| {
        let name = ctx.next_name(component, &label);
        resolved.entries.push(SlotEntry {
            label,
            unit: name.clone(),
        });
        resolved.units.push(SlotUnit { name, body });
    };

    for (label, body) in named {
        emit(label, body, ctx);
    }
    if !default.trim().is_empty() {
        emit(DEFAULT_SLOT_KEY.to_string(), default, ctx);
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_label_capitalized() {
        assert_eq!(slot_label("footer"), "Footer");
        assert_eq!(slot_label("Footer"), "Footer");
        assert_eq!(slot_label(""), DEFAULT_SLOT_KEY);
    }

    #[test]
    fn test_default_slot_only() {
        let mut ctx = SlotContext::new("pages.Home");
        let slots = resolve_slots("Guardar", "MyButton", &mut ctx);
        assert_eq!(
            slots.units,
            vec![SlotUnit {
                name: "pages.Home__MyButton__Slot__0".to_string(),
                body: "Guardar".to_string(),
            }]
        );
        assert_eq!(slots.entries[0].label, "Slot");
    }

    #[test]
    fn test_named_and_default_slots() {
        let mut ctx = SlotContext::new("pages.Home");
        let inner = "\n  contenido\n  <slot name=\"footer\"><b>Y</b></slot>\n";
        let slots = resolve_slots(inner, "Card", &mut ctx);

        assert_eq!(slots.units.len(), 2);
        assert_eq!(slots.units[0].name, "pages.Home__Card__Footer__0");
        assert_eq!(slots.units[0].body, "<b>Y</b>");
        assert_eq!(slots.units[1].name, "pages.Home__Card__Slot__1");
        assert_eq!(slots.units[1].body.trim(), "contenido");
        assert!(!slots.units[1].body.contains("<b>"));
    }

    #[test]
    fn test_whitespace_only_default_is_dropped() {
        let mut ctx = SlotContext::new("p");
        let slots = resolve_slots("  \n <slot name=\"Footer\">f</slot>\n ", "Card", &mut ctx);
        assert_eq!(slots.entries.len(), 1);
        assert_eq!(slots.entries[0].label, "Footer");
        assert!(resolve_slots("   \n\t", "Card", &mut ctx).is_empty());
    }

    #[test]
    fn test_unnamed_slot_marker_feeds_default() {
        let mut ctx = SlotContext::new("p");
        let slots = resolve_slots("a<slot>b</slot>c", "Card", &mut ctx);
        assert_eq!(slots.units.len(), 1);
        assert_eq!(slots.units[0].body, "abc");
    }

    #[test]
    fn test_repeated_labels_concatenate() {
        let mut ctx = SlotContext::new("p");
        let slots = resolve_slots(
            r#"<slot name="Footer">1</slot><slot name="Footer">2</slot>"#,
            "Card",
            &mut ctx,
        );
        assert_eq!(slots.units.len(), 1);
        assert_eq!(slots.units[0].body, "12");
    }

    #[test]
    fn test_counter_is_monotonic_across_calls() {
        let mut ctx = SlotContext::new("p");
        let a = resolve_slots("x", "Card", &mut ctx);
        let b = resolve_slots("y", "Card", &mut ctx);
        assert_ne!(a.units[0].name, b.units[0].name);
        assert_eq!(b.units[0].name, "p__Card__Slot__1");
    }

    #[test]
    fn test_prop_entries_capture_caller() {
        let mut ctx = SlotContext::new("p");
        let slots = resolve_slots("x", "Card", &mut ctx);
        assert_eq!(
            slots.prop_entries(),
            vec![
                (
                    "Slot".to_string(),
                    r#"deferred("{{ invoke(\"p__Card__Slot__0\", __caller) }}")"#.to_string()
                ),
                ("__caller".to_string(), "__ctx".to_string()),
            ]
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholder("Footer"),
            r#"{{ invoke("Footer", __ctx) if __ctx["Footer"] is defined }}"#
        );
        assert_eq!(
            placeholder_with_fallback("Slot", "none"),
            r#"{% if __ctx["Slot"] is defined %}{{ invoke("Slot", __ctx) }}{% else %}none{% endif %}"#
        );
    }
}
