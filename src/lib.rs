//! A TokensRegex-style rule engine.
//!
//! Rules files declare environment settings, pattern bindings and rule
//! records; the engine compiles them once and then tags token spans of many
//! documents with key/value annotations.
//!
//! ```text
//! rules text ── syntax ──▶ items ── loader ──▶ rule set ── compiler ──▶ Engine
//! (Engine, Document) ── runtime (stages, conflicts) ──▶ matches ── executor ──▶ annotations
//! ```

extern crate self as rulener;

#[macro_use]
mod macros;
mod api;
mod document;
mod engine;
mod error;
mod rules;
mod syntax;

use std::fmt;

pub use api::{Engine, Options, RuleCount, RuleFile, RunSummary, StageTiming, default_engine};
pub use document::{Document, Token};
pub use engine::{AnnotationKey, KeyRegistry, PatternFlags, RuleMeta, RuleType};
pub use error::{DocumentError, LoadError, LoadErrors, RuntimeError, SourcePos};

// --- Shared types -------------------------------------------------------------

/// An annotation value or a map-entry value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

/// Half-open token range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    /// First token index (inclusive).
    pub start: usize,
    /// Last token index (exclusive).
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_relations() {
        let a = Span::new(0, 3);
        let b = Span::new(2, 4);
        let c = Span::new(3, 5);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.contains(&Span::new(1, 3)));
        assert!(!a.contains(&b));
        assert_eq!(b.len(), 2);
        assert!(Span::new(2, 2).is_empty());
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::from("#FF0000").to_string(), "#FF0000");
        assert_eq!(Value::Int(7).to_string(), "7");
        assert_eq!(Value::Bool(true).to_string(), "true");
    }
}
