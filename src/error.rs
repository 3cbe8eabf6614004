//! Error taxonomy.
//!
//! Load-time failures (`LoadError`) are collected into a single `LoadErrors`
//! bundle and returned from the load entry points. Per-document failures
//! (`RuntimeError`) are never returned as `Err`; they are recorded on the
//! document's diagnostics channel and processing continues.

use std::fmt;

/// Position inside a rules file (1-based line and column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single load-time failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    /// Syntactic failure in a rules file.
    #[error("{source_name}:{pos}: parse error: {message}")]
    Parse { source_name: String, pos: SourcePos, message: String },

    /// Unresolved `$` reference, unknown annotation key or bad environment value.
    #[error("{source_name}:{pos}: resolution error: {message}")]
    Resolution { source_name: String, pos: SourcePos, message: String },

    /// Invalid regex or pattern structure in one rule.
    #[error("{source_name}:{pos}: compile error in rule `{rule}`: {message}")]
    Compile { source_name: String, pos: SourcePos, rule: String, message: String },
}

impl LoadError {
    pub fn is_compile(&self) -> bool {
        matches!(self, LoadError::Compile { .. })
    }
}

/// Every load-time error found while loading a rule set.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadErrors {
    errors: Vec<LoadError>,
}

impl LoadErrors {
    pub(crate) fn new(errors: Vec<LoadError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }

    pub fn errors(&self) -> &[LoadError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_vec(self) -> Vec<LoadError> {
        self.errors
    }
}

impl fmt::Display for LoadErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 { "error" } else { "errors" };
        write!(f, "failed to load rules ({} {noun})", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadErrors {}

/// A failure raised while processing one document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// The matcher faulted; the rule is skipped for the rest of the document.
    #[error("rule `{rule}` skipped: {message}")]
    Match { rule: String, message: String },

    /// One action of a clause failed; the remaining actions still ran.
    #[error("rule `{rule}` action #{index}: {message}")]
    Action { rule: String, index: usize, message: String },
}

/// A malformed document view.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("token {index} span {start}..{end} is out of bounds for text of length {len}")]
    OutOfBounds { index: usize, start: usize, end: usize, len: usize },

    #[error("token {index} span {start}..{end} is not on a char boundary")]
    NotCharBoundary { index: usize, start: usize, end: usize },

    #[error("token {index} is empty or starts before the end of the previous token")]
    Unordered { index: usize },
}
