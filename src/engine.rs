//! Rule loading, compilation and matching.
//!
//! This module is the internal entry point for the engine. It is split into
//! focused submodules under `src/engine/`; `api.rs` wires them together behind
//! [`crate::Engine`].
//!
//! ## How the parts work together
//!
//! ```text
//! rules files ── syntax::parse_source ──> items (per file, in load order)
//!                                            │
//!                          Loader::load_file (loader.rs)
//!                            - ENV settings and defaults
//!                            - key registry, `$Var` bindings
//!                            - rule records -> RuleDecl
//!                                            │
//!                          loader::build -> compile_rule (compiler.rs)
//!                            - char regexes / token programs
//!                            - action ops (executor.rs)
//!                                            │
//!                                            v
//!                          CompiledRules (compiled_rules.rs)
//!                                            │
//! document ──────────────> Runner::run (runtime.rs)
//!                            - per stage: filters, scan, actions, composites
//!                            - TokenMatcher / text_candidates (matcher.rs)
//!                                            │
//!                                            v
//!                          annotated tokens + RunMetrics (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `keys.rs`: opaque annotation keys and the name/class registry.
//! - `flags.rs`: legacy integer and named regex flags.
//! - `loader.rs`: environment, bindings and rule-record validation.
//! - `compiler.rs`: lowers pattern ASTs into matcher programs.
//! - `matcher.rs`: backtracking token matcher and text-rule candidates.
//! - `runtime.rs`: stage loop and conflict resolution.
//! - `executor.rs`: action compilation and execution.
//! - `metrics.rs`: timing and counters for a document run.

#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/compiler.rs"]
mod compiler;
#[path = "engine/executor.rs"]
mod executor;
#[path = "engine/flags.rs"]
mod flags;
#[path = "engine/keys.rs"]
mod keys;
#[path = "engine/loader.rs"]
pub(crate) mod loader;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/runtime.rs"]
mod runtime;

pub use compiled_rules::{RuleMeta, RuleType};
pub use flags::PatternFlags;
pub use keys::{AnnotationKey, KeyRegistry};

pub(crate) use compiled_rules::CompiledRules;
pub(crate) use loader::Loader;
pub(crate) use metrics::RunMetrics;
pub(crate) use runtime::Runner;
