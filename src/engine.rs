//! Composition engine.
//!
//! Compiles every unit's definitions into one base environment and seals it.
//! The base is never executed: each render checks out a private clone, and
//! every invocation inside a render clones the base again, so concurrent
//! renders share nothing mutable.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use minijinja::value::Value;
use minijinja::Environment;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::diagnostics;
use crate::discovery;
use crate::error::{Error, Result};
use crate::options::EngineOptions;
use crate::registry::ComponentRegistry;
use crate::runtime::{self, BaseNamespace};
use crate::source::{units_from_sources, SourceUnit};
use crate::transpile::{transpile_unit, Transpiled};

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILED NAMESPACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Every definition of a compilation pass, compiled once.
#[derive(Debug, Clone)]
pub struct CompiledNamespace {
    base: BaseNamespace,
    env: Environment<'static>,
    names: BTreeSet<String>,
    ir: String,
    fingerprint: String,
}

/// A private clone of the namespace. Executing it consumes the handle.
#[derive(Debug)]
pub struct Checkout {
    env: Environment<'static>,
}

impl Checkout {
    /// Execute `name` with `data` as the context.
    pub fn execute(self, name: &str, data: &Value) -> Result<String> {
        let template = self.env.get_template(name).map_err(|source| Error::Render {
            name: name.to_string(),
            source,
        })?;
        template
            .render(runtime::scope(data))
            .map_err(|source| Error::Render {
                name: name.to_string(),
                source,
            })
    }
}

/// Build the registry, transpile every unit in parallel and compile their
/// definitions.
pub fn compile(units: &[SourceUnit]) -> Result<CompiledNamespace> {
    let registry = ComponentRegistry::build_from_units(units);
    compile_with_registry(units, &registry)
}

pub fn compile_with_registry(
    units: &[SourceUnit],
    registry: &ComponentRegistry,
) -> Result<CompiledNamespace> {
    let transpiled: Vec<Transpiled> = units
        .par_iter()
        .map(|unit| transpile_unit(unit, registry))
        .collect();

    let ir: String = transpiled.iter().map(|t| t.ir.as_str()).collect();
    let recoveries: usize = transpiled.iter().map(|t| t.recoveries.len()).sum();

    // Registered from the structured definitions; the IR text is kept for
    // inspection and the fingerprint.
    let base = BaseNamespace::new();
    let mut env = base.environment();
    let mut names = BTreeSet::new();
    for definition in transpiled.into_iter().flat_map(|t| t.definitions) {
        if !names.insert(definition.name.clone()) {
            tracing::warn!(name = %definition.name, "duplicate definition, last one wins");
        }
        let name = definition.name;
        env.add_template_owned(name.clone(), definition.body)
            .map_err(|source| Error::Compile { name, source })?;
    }
    base.seal(env.clone());

    tracing::debug!(
        units = units.len(),
        components = registry.len(),
        definitions = names.len(),
        recoveries,
        "compiled namespace"
    );

    let fingerprint = format!("{:x}", Sha256::digest(ir.as_bytes()));
    Ok(CompiledNamespace {
        base,
        env,
        names,
        ir,
        fingerprint,
    })
}

impl CompiledNamespace {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Definition names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// The concatenated IR this namespace was compiled from.
    pub fn ir(&self) -> &str {
        &self.ir
    }

    /// SHA-256 of the IR, hex encoded.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn checkout(&self) -> Checkout {
        Checkout {
            env: self.env.clone(),
        }
    }

    /// Render the definition `name` with `data`.
    pub fn render<S: Serialize>(&self, name: &str, data: S) -> Result<String> {
        if !self.contains(name) {
            return Err(Error::MissingDefinition(name.to_string()));
        }
        self.checkout().execute(name, &Value::from_serialize(&data))
    }

    pub fn render_to<S: Serialize, W: Write>(&self, name: &str, data: S, mut out: W) -> Result<()> {
        let html = self.render(name, data)?;
        out.write_all(html.as_bytes()).map_err(Error::Write)
    }

    /// The sealed base every invocation clones.
    pub fn base(&self) -> &BaseNamespace {
        &self.base
    }

    /// Execute `name` with `props` in a private clone. Capitalized string
    /// props are installed as definitions, so they can fill slots. Failures
    /// are logged and yield empty markup.
    pub fn partial<S: Serialize>(&self, name: &str, props: S) -> String {
        let props = runtime::promote_string_props(&Value::from_serialize(&props));
        match runtime::partial(&self.env, name, &props) {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(component = name, error = %err, "partial execution failed");
                String::new()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Loaded sources plus their compiled namespace.
#[derive(Debug, Clone)]
pub struct Engine {
    options: EngineOptions,
    units: Vec<SourceUnit>,
    namespace: CompiledNamespace,
}

impl Engine {
    pub fn from_units(units: Vec<SourceUnit>, options: EngineOptions) -> Result<Self> {
        let registry = ComponentRegistry::build_from_units(&units);

        if options.debug {
            for diagnostic in diagnostics::check_units(&units, &registry) {
                tracing::error!("{}", diagnostic);
            }
        }

        let namespace = compile_with_registry(&units, &registry)?;
        if options.debug {
            tracing::debug!(fingerprint = namespace.fingerprint(), "generated IR:\n{}", namespace.ir());
        }

        Ok(Self {
            options,
            units,
            namespace,
        })
    }

    /// In-memory sources keyed by relative path.
    pub fn from_sources<I, K, V>(sources: I, options: EngineOptions) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_units(units_from_sources(sources), options)
    }

    /// Files named relative to their common directory.
    pub fn from_paths(paths: &[PathBuf], options: EngineOptions) -> Result<Self> {
        let units = discovery::load_units(paths)?;
        Self::from_units(units, options)
    }

    /// Every file under `root` matching the configured patterns.
    pub fn from_dir(root: &Path, options: EngineOptions) -> Result<Self> {
        let units = discovery::load_dir(root, &options.patterns)?;
        Self::from_units(units, options)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn namespace(&self) -> &CompiledNamespace {
        &self.namespace
    }

    pub fn render<S: Serialize>(&self, name: &str, data: S) -> Result<String> {
        self.namespace.render(name, data)
    }

    pub fn render_to<S: Serialize, W: Write>(&self, name: &str, data: S, out: W) -> Result<()> {
        self.namespace.render_to(name, data, out)
    }

    pub fn partial<S: Serialize>(&self, name: &str, props: S) -> String {
        self.namespace.partial(name, props)
    }

    pub fn template_names(&self) -> Vec<&str> {
        self.namespace.template_names()
    }

    pub fn ir(&self) -> &str {
        self.namespace.ir()
    }

    pub fn fingerprint(&self) -> &str {
        self.namespace.fingerprint()
    }
}
