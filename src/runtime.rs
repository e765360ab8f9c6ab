//! Template runtime glue.
//!
//! Registers the helper functions the IR calls into (`dict`, `merge`, `cat`,
//! `deferred`, `invoke`) and implements the isolation protocol: every
//! invocation runs in a private clone of the sealed base namespace, never of
//! the calling environment. Slot sources produced by the transpiler are
//! installed as definitions inside that clone only. Plain data is never
//! installed, whatever its key looks like.
//!
//! The public `partial` entry point is the one place where caller-supplied
//! capitalized strings become definitions: they are promoted to slot sources
//! under `__slots` before the call.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use minijinja::value::{Object, ObjectRepr, Rest, Value, ValueKind};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, State};

use crate::matcher::is_component_tag;
use crate::props::CONTEXT_VAR;

/// Maximum nesting of `invoke` calls on one thread.
pub const MAX_INVOKE_DEPTH: usize = 64;

/// Props key holding slot sources promoted from caller-supplied strings.
pub const SLOTS_VAR: &str = "__slots";

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

type BaseCell = OnceLock<Environment<'static>>;

/// The compiled base namespace every invocation clones.
///
/// Environments built by [`BaseNamespace::environment`] hold a weak handle to
/// it, so `invoke` resolves against the base once [`BaseNamespace::seal`] has
/// stored the finished environment.
#[derive(Debug, Clone, Default)]
pub struct BaseNamespace(Arc<BaseCell>);

impl BaseNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh environment with the helper functions and HTML auto-escaping
    /// for every definition.
    pub fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_function("dict", dict);
        env.add_function("merge", merge);
        env.add_function("cat", cat);
        env.add_function("deferred", deferred);

        let base = Arc::downgrade(&self.0);
        env.add_function("invoke", move |name: String, props: Option<Value>| {
            invoke(&base, &name, props)
        });
        env
    }

    /// Store the finished environment. Only the first call takes effect.
    pub fn seal(&self, env: Environment<'static>) {
        if self.0.set(env).is_err() {
            tracing::warn!("base namespace already sealed, keeping the first");
        }
    }

    pub fn get(&self) -> Option<&Environment<'static>> {
        self.0.get()
    }
}

/// Slot source stored under a slot key. Only compiled IR and
/// [`promote_string_props`] create one, so request data never reaches the
/// template parser.
#[derive(Debug)]
pub struct DeferredSlot(String);

impl DeferredSlot {
    pub fn source(&self) -> &str {
        &self.0
    }
}

impl Object for DeferredSlot {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }
}

/// Execution context for `data`: its top-level keys plus `__ctx` holding the
/// whole value.
pub fn scope(data: &Value) -> Value {
    let mut map: BTreeMap<String, Value> = BTreeMap::new();
    if data.kind() == ValueKind::Map {
        if let Ok(keys) = data.try_iter() {
            for key in keys {
                let Some(name) = key.as_str() else {
                    continue;
                };
                if let Ok(value) = data.get_item(&key) {
                    map.insert(name.to_string(), value);
                }
            }
        }
    }
    map.insert(CONTEXT_VAR.to_string(), data.clone());
    Value::from(map)
}

/// Execute `name` with `props` in a private clone of `base`, installing the
/// slot sources found in `props`.
pub fn partial(base: &Environment<'static>, name: &str, props: &Value) -> Result<String, Error> {
    let _depth = DepthGuard::enter(name)?;
    let mut local = base.clone();
    install_slots(&mut local, props);
    if let Ok(promoted) = props.get_attr(SLOTS_VAR) {
        install_slots(&mut local, &promoted);
    }
    let template = local.get_template(name)?;
    template.render(scope(props))
}

/// Copy of `props` whose capitalized string values are also available as
/// slot sources under `__slots`. The originals stay in place as data.
pub fn promote_string_props(props: &Value) -> Value {
    let mut map: BTreeMap<String, Value> = BTreeMap::new();
    let mut slots: BTreeMap<String, Value> = BTreeMap::new();
    if props.kind() == ValueKind::Map {
        if let Ok(keys) = props.try_iter() {
            for key in keys {
                let Ok(value) = props.get_item(&key) else {
                    continue;
                };
                let name = key_string(&key);
                if is_component_tag(&name) {
                    if let Some(source) = value.as_str() {
                        slots.insert(name.clone(), deferred(source.to_string()));
                    }
                }
                map.insert(name, value);
            }
        }
    }
    if !slots.is_empty() {
        map.insert(SLOTS_VAR.to_string(), Value::from(slots));
    }
    Value::from(map)
}

/// Install every capitalized key holding a [`DeferredSlot`].
fn install_slots(env: &mut Environment<'static>, props: &Value) {
    if props.kind() != ValueKind::Map {
        return;
    }
    let Ok(keys) = props.try_iter() else {
        return;
    };
    for key in keys {
        let Some(name) = key.as_str() else {
            continue;
        };
        if !is_component_tag(name) {
            continue;
        }
        let Ok(value) = props.get_item(&key) else {
            continue;
        };
        let Some(slot) = value.downcast_object_ref::<DeferredSlot>() else {
            continue;
        };
        if let Err(err) = env.add_template_owned(name.to_string(), slot.source().to_string()) {
            tracing::debug!(key = name, error = %err, "slot source not installable as a definition");
        }
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter(name: &str) -> Result<Self, Error> {
        DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_INVOKE_DEPTH {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("invocation of `{}` nested deeper than {}", name, MAX_INVOKE_DEPTH),
                ));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn invoke(base: &Weak<BaseCell>, name: &str, props: Option<Value>) -> Value {
    let props = props.unwrap_or_default();
    let result = match base.upgrade() {
        Some(cell) => match cell.get() {
            Some(env) => partial(env, name, &props),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                "base namespace is not sealed yet",
            )),
        },
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            "base namespace was dropped",
        )),
    };
    match result {
        Ok(html) => Value::from_safe_string(html),
        Err(err) => {
            tracing::warn!(component = name, error = %err, "partial execution failed");
            Value::from_safe_string(String::new())
        }
    }
}

/// `deferred("source")`: mark template source as an installable slot.
fn deferred(source: String) -> Value {
    Value::from_object(DeferredSlot(source))
}

/// `dict("k1", v1, "k2", v2, ...)`. A repeated key keeps its last value.
fn dict(args: Rest<Value>) -> Result<Value, Error> {
    if args.0.len() % 2 != 0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict expects an even number of arguments",
        ));
    }
    let mut map: BTreeMap<String, Value> = BTreeMap::new();
    for pair in args.0.chunks(2) {
        map.insert(key_string(&pair[0]), pair[1].clone());
    }
    Ok(Value::from(map))
}

/// `merge(a, b, ...)`: later maps win on key conflicts. Undefined and none
/// operands contribute nothing.
fn merge(args: Rest<Value>) -> Result<Value, Error> {
    let mut map: BTreeMap<String, Value> = BTreeMap::new();
    for value in args.0.iter() {
        match value.kind() {
            ValueKind::Map => {
                for key in value.try_iter()? {
                    let item = value.get_item(&key)?;
                    map.insert(key_string(&key), item);
                }
            }
            ValueKind::Undefined | ValueKind::None => {}
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("cannot merge a value of kind {:?}", other),
                ))
            }
        }
    }
    Ok(Value::from(map))
}

/// Concatenate values into markup. Unsafe operands are escaped first.
fn cat(state: &State, args: Rest<Value>) -> Result<Value, Error> {
    let mut out = String::new();
    for value in args.0.iter() {
        if value.is_undefined() || value.is_none() {
            continue;
        }
        if value.is_safe() {
            out.push_str(&value.to_string());
        } else {
            out.push_str(&minijinja::filters::escape(state, value)?.to_string());
        }
    }
    Ok(Value::from_safe_string(out))
}

fn key_string(key: &Value) -> String {
    match key.as_str() {
        Some(s) => s.to_string(),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;
    use pretty_assertions::assert_eq;

    fn sealed(templates: &[(&str, &str)]) -> BaseNamespace {
        let base = BaseNamespace::new();
        let mut env = base.environment();
        for (name, source) in templates {
            env.add_template_owned(name.to_string(), source.to_string())
                .unwrap();
        }
        base.seal(env);
        base
    }

    fn render(base: &BaseNamespace, name: &str, data: Value) -> String {
        base.get()
            .unwrap()
            .get_template(name)
            .unwrap()
            .render(scope(&data))
            .unwrap()
    }

    #[test]
    fn test_scope_exposes_whole_value() {
        let base = sealed(&[("t", "{{ A }}|{{ __ctx.A }}|{{ __ctx is mapping }}")]);
        assert_eq!(render(&base, "t", context! { A => "x" }), "x|x|true");
    }

    #[test]
    fn test_dict_and_merge_precedence() {
        let base = sealed(&[(
            "t",
            r#"{% set p = merge(dict("Name", "base", "K", 1), dict("Name", "X")) %}{{ p.Name }}-{{ p.K }}"#,
        )]);
        assert_eq!(render(&base, "t", context! {}), "X-1");
    }

    #[test]
    fn test_merge_ignores_undefined() {
        let base = sealed(&[("t", r#"{{ merge(Missing, dict("A", 1)).A }}"#)]);
        assert_eq!(render(&base, "t", context! {}), "1");
    }

    #[test]
    fn test_invoke_renders_in_isolation() {
        let base = sealed(&[
            ("Greet", "<b>{{ Name }}</b>{{ Outer }}"),
            ("page", r#"{{ invoke("Greet", dict("Name", "<x>")) }}"#),
        ]);
        assert_eq!(
            render(&base, "page", context! { Outer => "leak" }),
            "<b>&lt;x&gt;</b>"
        );
    }

    #[test]
    fn test_deferred_slots_become_definitions() {
        let base = sealed(&[
            ("Box", r#"[{{ invoke("Slot", __ctx) if __ctx["Slot"] is defined }}]"#),
            (
                "page",
                r#"{{ invoke("Box", dict("Slot", deferred("hi {{ 1 + 1 }}"))) }}|{{ invoke("Box", dict()) }}"#,
            ),
        ]);
        assert_eq!(render(&base, "page", context! {}), "[hi 2]|[]");
    }

    #[test]
    fn test_plain_string_props_are_never_installed() {
        let base = sealed(&[
            ("Icon", "<i></i>"),
            ("Box", r#"[{{ invoke("Icon", dict()) }}|{{ invoke("Slot", __ctx) }}]"#),
            ("page", r#"{{ invoke("Box", dict("Icon", "{{ 6 * 7 }}", "Slot", "{{ 6 * 7 }}")) }}"#),
        ]);
        assert_eq!(render(&base, "page", context! {}), "[<i></i>|]");
    }

    #[test]
    fn test_nested_invocations_clone_the_base() {
        // `Icon` installed as a slot inside Outer must not replace the
        // component for invocations Outer makes.
        let base = sealed(&[
            ("Icon", "<i></i>"),
            ("Outer", r#"{{ invoke("Icon", dict()) }}"#),
            ("page", r#"{{ invoke("Outer", dict("Icon", deferred("shadow"))) }}"#),
        ]);
        assert_eq!(render(&base, "page", context! {}), "<i></i>");
    }

    #[test]
    fn test_promoted_string_props_reach_placeholders() {
        let base = sealed(&[("Box", r#"[{{ invoke("Slot", __ctx) }}|{{ Slot }}]"#)]);
        let env = base.get().unwrap();
        let props = Value::from(BTreeMap::from([
            ("Slot".to_string(), Value::from("s{{ 1 }}")),
            ("lower".to_string(), Value::from("{{ 2 }}")),
        ]));

        assert_eq!(partial(env, "Box", &props).unwrap(), "[|s{{ 1 }}]");
        let promoted = promote_string_props(&props);
        assert_eq!(partial(env, "Box", &promoted).unwrap(), "[s1|s{{ 1 }}]");
        assert!(promoted.get_attr(SLOTS_VAR).unwrap().get_attr("lower").unwrap().is_undefined());
        assert!(env.get_template("Slot").is_err());
    }

    #[test]
    fn test_forged_slot_map_is_ignored() {
        let base = sealed(&[("Box", r#"[{{ invoke("Slot", __ctx) }}]"#)]);
        let env = base.get().unwrap();
        let forged = Value::from_serialize(serde_json::json!({ "__slots": { "Slot": "{{ 6 * 7 }}" } }));
        assert_eq!(partial(env, "Box", &forged).unwrap(), "[]");
    }

    #[test]
    fn test_unsealed_base_degrades_to_empty() {
        let base = BaseNamespace::new();
        let mut env = base.environment();
        env.add_template_owned("page", r#"a{{ invoke("page", dict()) }}b"#)
            .unwrap();
        let html = env.get_template("page").unwrap().render(context! {}).unwrap();
        assert_eq!(html, "ab");
    }

    #[test]
    fn test_missing_invocation_degrades_to_empty() {
        let base = sealed(&[("page", r#"a{{ invoke("Nope", dict()) }}b"#)]);
        assert_eq!(render(&base, "page", context! {}), "ab");
    }

    #[test]
    fn test_cat_escapes_unsafe_operands() {
        let base = sealed(&[("t", r#"{{ cat("<i>", invoke("I", dict()), N) }}"#), ("I", "<i>")]);
        assert_eq!(render(&base, "t", context! { N => 3 }), "&lt;i&gt;<i>3");
    }

    #[test]
    fn test_runaway_recursion_is_bounded() {
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let base = sealed(&[("Loop", r#"x{{ invoke("Loop", __ctx) }}"#)]);
                let env = base.get().unwrap();
                partial(env, "Loop", &Value::from(BTreeMap::<String, Value>::new()))
            })
            .unwrap();
        let html = handle.join().unwrap().unwrap();
        assert_eq!(html, "x".repeat(MAX_INVOKE_DEPTH));
    }
}
