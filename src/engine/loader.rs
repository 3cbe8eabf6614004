//! Rule-set loader.
//!
//! Walks the parsed items of every rules file in load order and resolves
//! them into rule declarations:
//!
//! ```text
//! ENV.defaultStringPatternFlags ──▶ flags captured by each later rule
//! ENV.defaults.<key>            ──▶ fallback for rule records omitting <key>
//! name = { type: "CLASS", … }   ──▶ KeyRegistry
//! $Name = pattern               ──▶ bindings (expanded eagerly, no forward refs)
//! { ruleType: …, … }            ──▶ RuleDecl (pattern fully expanded)
//! ```
//!
//! Environment settings and bindings carry forward from one file into the
//! next; a later assignment replaces an earlier one from that point on.
//! Every declaration is then compiled (`compiler.rs`, `executor.rs`) and
//! indexed (`compiled_rules.rs`).

use super::compiled_rules::{CompiledRule, CompiledRules, RuleMeta, RuleType};
use super::compiler;
use super::flags::PatternFlags;
use super::keys::KeyRegistry;
use crate::Value;
use crate::error::{LoadError, SourcePos};
use crate::syntax::ast::{ActionCall, Branch, FieldValue, Item, Literal, PatternExpr, RuleRecord};
use std::collections::HashMap;

/// Rule-record keys that may be given a default through `ENV.defaults`.
const DEFAULTABLE_KEYS: &[&str] = &["ruleType", "priority", "stage", "name"];

/// A resolved, not yet compiled rule.
#[derive(Debug, Clone)]
pub(crate) struct RuleDecl {
    pub meta: RuleMeta,
    /// Pattern with every `$Name` reference replaced by its binding.
    pub pattern: PatternExpr,
    pub actions: Vec<ActionCall>,
    /// Default string-pattern flags in effect where the rule was declared.
    pub flags: PatternFlags,
}

#[derive(Debug, Default)]
pub(crate) struct Loader {
    flags: PatternFlags,
    defaults: HashMap<String, Literal>,
    bindings: HashMap<String, PatternExpr>,
    keys: KeyRegistry,
    rules: Vec<RuleDecl>,
    errors: Vec<LoadError>,
    next_order: usize,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the items of one file. Errors are collected, not returned.
    pub fn load_file(&mut self, source_name: &str, items: Vec<Item>) {
        for item in items {
            match item {
                Item::Env { path, value, pos } => self.env(source_name, &path, value, pos),
                Item::Assign { name, value, pos } => self.assign(source_name, &name, value, pos),
                Item::Binding { name, pattern, pos } => {
                    let mut unresolved = Vec::new();
                    let expanded = self.expand(pattern, &mut unresolved);
                    if unresolved.is_empty() {
                        log::trace!("bound ${name} at {source_name}:{pos}");
                        self.bindings.insert(name, expanded);
                    } else {
                        for (pos, message) in unresolved {
                            self.errors.push(resolution(source_name, pos, message));
                        }
                    }
                }
                Item::Rule(record) => self.rule(source_name, record),
            }
        }
    }

    /// Hand back the declarations, the key registry and every error found.
    ///
    /// Declarations with errors are left out, so the rest can still be
    /// compiled to report their own errors in the same load.
    pub fn finish(self) -> (Vec<RuleDecl>, KeyRegistry, Vec<LoadError>) {
        (self.rules, self.keys, self.errors)
    }

    // --- top-level items ----------------------------------------------------------

    fn env(&mut self, source_name: &str, path: &[String], value: Literal, pos: SourcePos) {
        let keys: Vec<&str> = path.iter().map(String::as_str).collect();
        match keys.as_slice() {
            ["defaultStringPatternFlags"] => {
                let flags = match &value {
                    Literal::Value(Value::Int(bits)) => PatternFlags::from_legacy(*bits),
                    Literal::Value(Value::Str(names)) => PatternFlags::from_names(names),
                    other => Err(format!("expected an integer bitmask or flag names, found {}", other.describe())),
                };
                match flags {
                    Ok(flags) => {
                        log::debug!("{source_name}:{pos}: default string pattern flags = {flags:?}");
                        self.flags = flags;
                    }
                    Err(message) => self.errors.push(resolution(source_name, pos, message)),
                }
            }
            ["defaults", key] => {
                if !DEFAULTABLE_KEYS.contains(key) {
                    let message =
                        format!("`{key}` cannot have a default (expected one of {})", DEFAULTABLE_KEYS.join(", "));
                    self.errors.push(resolution(source_name, pos, message));
                    return;
                }
                self.defaults.insert(key.to_string(), value);
            }
            _ => log::warn!("{source_name}:{pos}: ignoring unrecognized environment key `ENV.{}`", path.join(".")),
        }
    }

    fn assign(&mut self, source_name: &str, name: &str, value: Literal, pos: SourcePos) {
        let class = match value {
            Literal::Class(class) => class,
            // `alias = ner` reuses the class already bound to `ner`.
            Literal::Ident(other) => match self.keys.get(&other).and_then(|k| self.keys.class_of(k)) {
                Some(class) => class.to_string(),
                None => {
                    let message = format!("unknown annotation key `{other}`");
                    self.errors.push(resolution(source_name, pos, message));
                    return;
                }
            },
            other => {
                let message = format!("`{name}` must be bound to a class reference, found {}", other.describe());
                self.errors.push(resolution(source_name, pos, message));
                return;
            }
        };
        let key = self.keys.bind(name, &class);
        log::debug!("{source_name}:{pos}: annotation key `{name}` -> {key} ({class})");
    }

    fn rule(&mut self, source_name: &str, record: RuleRecord) {
        let order = self.next_order;
        self.next_order += 1;

        let before = self.errors.len();
        let rule_type = self.rule_type(source_name, &record);
        let priority = self.number(source_name, &record, "priority").unwrap_or(0.0);
        let stage = self.stage(source_name, &record);
        let name = self.name(source_name, &record);

        let pattern = match record.get("pattern") {
            Some(FieldValue::Pattern(p)) => Some(p.clone()),
            _ => {
                self.errors.push(parse(source_name, record.pos, "rule record is missing required key `pattern`"));
                None
            }
        };
        let actions = match record.get("action") {
            Some(FieldValue::Action(calls)) => calls.clone(),
            _ if rule_type == Some(RuleType::Filter) => Vec::new(),
            _ => {
                self.errors.push(parse(source_name, record.pos, "rule record is missing required key `action`"));
                Vec::new()
            }
        };

        let (Some(rule_type), Some(pattern)) = (rule_type, pattern) else { return };
        if self.errors.len() > before {
            return;
        }

        let mut unresolved = Vec::new();
        let pattern = self.expand(pattern, &mut unresolved);
        if !unresolved.is_empty() {
            for (pos, message) in unresolved {
                self.errors.push(resolution(source_name, pos, message));
            }
            return;
        }

        let meta = RuleMeta {
            name,
            source_name: source_name.to_string(),
            pos: record.pos,
            rule_type,
            priority,
            stage,
            order,
        };
        log::trace!("declared rule `{}` ({}, stage {}, priority {})", meta.name, rule_type, stage, priority);
        self.rules.push(RuleDecl { meta, pattern, actions, flags: self.flags });
    }

    // --- rule-record fields -------------------------------------------------------

    /// A literal field of `record`, falling back to `ENV.defaults`.
    fn literal<'r>(&'r self, record: &'r RuleRecord, key: &str) -> Option<&'r Literal> {
        match record.get(key) {
            Some(FieldValue::Literal(lit)) => Some(lit),
            Some(_) => None,
            None => self.defaults.get(key),
        }
    }

    fn rule_type(&mut self, source_name: &str, record: &RuleRecord) -> Option<RuleType> {
        let pos = record.pos_of("ruleType");
        let result = match self.literal(record, "ruleType") {
            Some(Literal::Value(Value::Str(s))) | Some(Literal::Ident(s)) => RuleType::parse(s)
                .ok_or_else(|| format!("unknown ruleType `{s}` (expected text, tokens, composite or filter)")),
            Some(other) => Err(format!("ruleType must be a string, found {}", other.describe())),
            None if record.get("ruleType").is_some() => Err("ruleType must be a string".to_string()),
            None => Err("rule record is missing required key `ruleType`".to_string()),
        };
        result.map_err(|message| self.errors.push(parse(source_name, pos, message))).ok()
    }

    fn number(&mut self, source_name: &str, record: &RuleRecord, key: &str) -> Option<f64> {
        let pos = record.pos_of(key);
        match self.literal(record, key) {
            None => None,
            Some(Literal::Value(Value::Int(n))) => Some(*n as f64),
            Some(Literal::Value(Value::Float(n))) => Some(*n),
            Some(other) => {
                let message = format!("`{key}` must be a number, found {}", other.describe());
                self.errors.push(parse(source_name, pos, message));
                None
            }
        }
    }

    fn stage(&mut self, source_name: &str, record: &RuleRecord) -> i64 {
        let pos = record.pos_of("stage");
        match self.literal(record, "stage") {
            None => 0,
            Some(Literal::Value(Value::Int(n))) => *n,
            Some(other) => {
                let message = format!("`stage` must be an integer, found {}", other.describe());
                self.errors.push(parse(source_name, pos, message));
                0
            }
        }
    }

    fn name(&mut self, source_name: &str, record: &RuleRecord) -> String {
        let fallback = format!("{source_name}:{}", record.pos.line);
        match self.literal(record, "name") {
            None => fallback,
            Some(Literal::Value(Value::Str(s))) | Some(Literal::Ident(s)) => {
                // A name default would make every rule look the same.
                if record.get("name").is_some() { s.clone() } else { format!("{s}@{fallback}") }
            }
            Some(other) => {
                let message = format!("`name` must be a string, found {}", other.describe());
                self.errors.push(parse(source_name, record.pos_of("name"), message));
                fallback
            }
        }
    }

    // --- variable expansion -------------------------------------------------------

    /// Replace `$Name` references with their bound expressions. Bindings are
    /// stored already expanded, so one level of substitution suffices and
    /// group numbering later runs over the fully expanded tree.
    fn expand(&self, pattern: PatternExpr, unresolved: &mut Vec<(SourcePos, String)>) -> PatternExpr {
        match pattern {
            PatternExpr::Var { name, pos } => match self.bindings.get(&name) {
                Some(bound) => bound.clone(),
                None => {
                    unresolved.push((pos, format!("unresolved reference `${name}`")));
                    PatternExpr::AnyToken
                }
            },
            PatternExpr::Group(inner) => PatternExpr::Group(Box::new(self.expand(*inner, unresolved))),
            PatternExpr::Seq(items) => PatternExpr::Seq(items.into_iter().map(|p| self.expand(p, unresolved)).collect()),
            PatternExpr::Alt(branches) => PatternExpr::Alt(
                branches
                    .into_iter()
                    .map(|b| Branch { pattern: self.expand(b.pattern, unresolved), value: b.value })
                    .collect(),
            ),
            PatternExpr::Repeat { inner, min, max, greedy } => {
                PatternExpr::Repeat { inner: Box::new(self.expand(*inner, unresolved)), min, max, greedy }
            }
            leaf => leaf,
        }
    }
}

fn parse(source_name: &str, pos: SourcePos, message: impl Into<String>) -> LoadError {
    LoadError::Parse { source_name: source_name.to_string(), pos, message: message.into() }
}

fn resolution(source_name: &str, pos: SourcePos, message: impl Into<String>) -> LoadError {
    LoadError::Resolution { source_name: source_name.to_string(), pos, message: message.into() }
}

/// Compile every declaration into a runnable rule set.
///
/// With `lenient`, rules failing with a compile error are skipped and the
/// errors come back as warnings; every other error still fails the load.
pub(crate) fn build(
    decls: Vec<RuleDecl>,
    mut keys: KeyRegistry,
    lenient: bool,
) -> Result<(CompiledRules, Vec<LoadError>), Vec<LoadError>> {
    let mut rules: Vec<CompiledRule> = Vec::with_capacity(decls.len());
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for decl in decls {
        match compiler::compile_rule(decl, &mut keys) {
            Ok(rule) => rules.push(rule),
            Err(err) if lenient && err.is_compile() => {
                log::warn!("skipping rule: {err}");
                warnings.push(err);
            }
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    log::debug!("compiled {} rules ({} skipped)", rules.len(), warnings.len());
    Ok((CompiledRules::new(rules, keys), warnings))
}
