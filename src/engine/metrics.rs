//! Engine run metrics.
//!
//! A document run records, per stage, how long the scan and each composite
//! iteration took and how many matches they committed, plus a match count for
//! every rule. `api.rs` turns this into the public `RunSummary`.
//!
//! Collection is cheap (a few `Instant`s and counters), so it is always on.

use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub(crate) struct RunMetrics {
    /// Total elapsed time for the document.
    pub total: Duration,
    pub stages: Vec<StageMetrics>,
    /// Committed matches per rule, indexed by `RuleId`.
    pub rule_matches: Vec<usize>,
}

impl RunMetrics {
    pub fn changed(&self) -> usize {
        self.stages.iter().map(StageMetrics::changed).sum()
    }
}

/// Timings for one stage.
#[derive(Debug, Default, Clone)]
pub(crate) struct StageMetrics {
    pub stage: i64,
    /// Total elapsed time for the stage (filters, scan, actions, composites).
    pub duration: Duration,
    /// Filter matches found before the scan.
    pub filtered: usize,
    /// The left-to-right scan over text and token rules.
    pub scan: PassMetrics,
    /// One entry per composite iteration that committed something.
    pub composite: Vec<PassMetrics>,
}

impl StageMetrics {
    pub fn changed(&self) -> usize {
        self.scan.changed + self.composite.iter().map(|p| p.changed).sum::<usize>()
    }
}

/// Timing and counts for a single pass.
#[derive(Debug, Default, Clone)]
pub(crate) struct PassMetrics {
    /// Elapsed time for the pass, actions included.
    pub duration: Duration,
    /// Matches committed.
    pub committed: usize,
    /// Candidates dropped because a filter match covered them.
    pub vetoed: usize,
    /// Annotations whose value changed.
    pub changed: usize,
}
