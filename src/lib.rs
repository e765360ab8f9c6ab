//! # Tagweave
//!
//! JSX-like components over a named-template runtime. Authors write markup
//! with custom tags (`<Card Title="x">…</Card>`, `<Icon/>`, named slots,
//! `{...spread}` props); the crate rewrites it into template definitions and
//! invocations that `minijinja` executes.
//!
//! ## Composition Invariants
//!
//! 1. **Registry First**: only names in the [`ComponentRegistry`] are
//!    invocations. Every other capitalized tag passes through as markup.
//!
//! 2. **Depth-Correct Matching**: a paired tag closes at the close tag of the
//!    same name that brings its depth back to zero. Tags of other names never
//!    move the counter.
//!
//! 3. **Precedence**: literal attributes override spreads, slot content
//!    overrides both.
//!
//! 4. **Same-Batch Slots**: every generated slot definition an invocation
//!    references is emitted in the same IR batch, ahead of its owner.
//!
//! 5. **Clone Per Call**: the compiled base namespace is never executed. Each
//!    render and each invocation runs in a private clone of the base, never
//!    of its caller's environment. Slot sources installed as definitions live
//!    only in that clone, and plain data is never installed.
//!
//! ## Failure Policy
//!
//! Unclosed tags and bodies the template parser rejects are recovered locally
//! (see [`Recovery`]); a rejected body is kept verbatim inside a raw block, so
//! one bad unit never fails the pass. A definition the runtime still refuses
//! to compile fails the whole pass; no partial namespace is ever returned.

pub mod diagnostics;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod ir;
pub mod markup;
pub mod matcher;
pub mod options;
pub mod props;
pub mod registry;
pub mod runtime;
pub mod slots;
pub mod source;
pub mod structure;
pub mod transpile;


pub use engine::{compile, Checkout, CompiledNamespace, Engine};
pub use error::{Error, Recovery, Result};
pub use options::EngineOptions;
pub use registry::ComponentRegistry;
pub use source::{units_from_sources, SourceUnit};
pub use transpile::{transpile, transpile_unit, Transpiled};
