//! Compiled rule set and its stage index.
//!
//! This module holds the *static* side of the engine: everything derived from
//! the rules files once at load time and shared read-only by every document
//! run afterwards.
//!
//! Running a document is split the same way the rules are indexed:
//!
//! 1. **Compile/index rules** (this module): every rule gets a program
//!    (`compiler.rs`), an action list (`executor.rs`) and `RuleMeta`; the
//!    rule ids are then grouped per stage and per rule type.
//! 2. **Run** (see `runtime.rs`): walk the stages in ascending order and use
//!    the per-stage lists to decide which rules scan at which point.
//!
//! ## Invariants
//!
//! - `RuleId` is an index into `CompiledRules::rules`; `RuleMeta::order` is
//!   the global declaration order across all loaded files and is the last
//!   conflict tie-break.
//! - `CompiledRules::stages` is sorted by ascending stage number and each
//!   per-type list keeps declaration order.
//! - Nothing here is mutated after `CompiledRules::new`, so a compiled set is
//!   `Send + Sync` and can be shared across worker threads.

use super::compiler::Program;
use super::executor::ActionOp;
use super::keys::KeyRegistry;
use crate::Value;
use crate::error::SourcePos;
use std::fmt;

// --- Rule compilation and indexing -------------------------------------------

/// Rule identifier (index into the rules vector).
pub(crate) type RuleId = usize;

/// How a rule's `pattern` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Character regex over the document text.
    Text,
    /// Token-sequence pattern.
    Tokens,
    /// Token-sequence pattern re-applied until a fixpoint after the stage scan.
    Composite,
    /// Token-sequence pattern whose matches veto other candidates of the stage.
    Filter,
}

impl RuleType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(RuleType::Text),
            "tokens" => Some(RuleType::Tokens),
            "composite" => Some(RuleType::Composite),
            "filter" => Some(RuleType::Filter),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Text => "text",
            RuleType::Tokens => "tokens",
            RuleType::Composite => "composite",
            RuleType::Filter => "filter",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a rule.
#[derive(Debug, Clone)]
pub struct RuleMeta {
    pub name: String,
    pub source_name: String,
    pub pos: SourcePos,
    pub rule_type: RuleType,
    pub priority: f64,
    pub stage: i64,
    /// Global declaration order.
    pub order: usize,
}

/// A rule ready to run.
#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub meta: RuleMeta,
    pub program: Program,
    /// Map-entry values, indexed by the program's alternation branches.
    pub values: Vec<Value>,
    pub actions: Vec<ActionOp>,
}

/// Rule ids of one stage, split by rule type.
#[derive(Debug, Default, Clone)]
pub(crate) struct StageIndex {
    pub stage: i64,
    pub text: Vec<RuleId>,
    pub tokens: Vec<RuleId>,
    pub composite: Vec<RuleId>,
    pub filter: Vec<RuleId>,
}

impl StageIndex {
    pub fn len(&self) -> usize {
        self.text.len() + self.tokens.len() + self.composite.len() + self.filter.len()
    }
}

/// Pre-compiled rule set with metadata and indexes.
#[derive(Debug)]
pub(crate) struct CompiledRules {
    pub rules: Vec<CompiledRule>,
    pub stages: Vec<StageIndex>,
    pub keys: KeyRegistry,
}

impl CompiledRules {
    /// Index `rules` by stage. Rules are expected in declaration order.
    pub fn new(rules: Vec<CompiledRule>, keys: KeyRegistry) -> Self {
        let mut stages: Vec<StageIndex> = Vec::new();

        for (id, rule) in rules.iter().enumerate() {
            let stage = rule.meta.stage;
            let slot = match stages.binary_search_by_key(&stage, |s| s.stage) {
                Ok(slot) => slot,
                Err(slot) => {
                    stages.insert(slot, StageIndex { stage, ..StageIndex::default() });
                    slot
                }
            };
            let index = &mut stages[slot];
            match rule.meta.rule_type {
                RuleType::Text => index.text.push(id),
                RuleType::Tokens => index.tokens.push(id),
                RuleType::Composite => index.composite.push(id),
                RuleType::Filter => index.filter.push(id),
            }
        }

        for index in &stages {
            log::debug!(
                "stage {}: {} text, {} tokens, {} composite, {} filter rules",
                index.stage,
                index.text.len(),
                index.tokens.len(),
                index.composite.len(),
                index.filter.len()
            );
        }

        CompiledRules { rules, stages, keys }
    }

    pub fn meta(&self, id: RuleId) -> &RuleMeta {
        &self.rules[id].meta
    }
}
