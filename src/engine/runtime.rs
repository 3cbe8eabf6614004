//! Matcher runtime: stages, conflict resolution and action dispatch.
//!
//! This module is the operational core of the engine. For one document it:
//!
//! - walks the stages of a `CompiledRules` in ascending order;
//! - collects filter matches, which veto every candidate overlapping them;
//! - scans the tokens left to right, evaluating every text and token rule of
//!   the stage at each position and committing the best candidate;
//! - runs the committed matches' actions (see `executor.rs`);
//! - re-applies composite rules until an iteration commits nothing.
//!
//! ## Pass structure
//!
//! ```text
//! for stage in stages (ascending):
//!   (0) filters        -> veto spans (+ their optional actions)
//!   (1) scan           -> non-overlapping matches, claimed tokens
//!   (2) actions        -> annotations, left to right
//!   (3) composite loop -> match unclaimed tokens, act, repeat to fixpoint
//! ```
//!
//! Conflicts among candidates starting at the same position are settled by
//! higher priority, then the longer span, then the earlier declaration. After
//! a commit the scan continues after the match.
//!
//! Composite matches never touch tokens claimed by the scan. A composite match
//! may overlap one from an earlier iteration only by containing it whole, and
//! a rule never commits the same span twice, so the loop terminates.
//!
//! A matcher fault disables that rule for the rest of the document and is
//! recorded on the document's diagnostics; it never aborts the run.

use super::compiled_rules::{CompiledRules, RuleId, StageIndex};
use super::compiler::Program;
use super::executor;
use super::matcher::{Match, MatchFault, TokenMatcher, text_candidates};
use super::metrics::{PassMetrics, RunMetrics, StageMetrics};
use crate::Span;
use crate::document::Document;
use crate::error::RuntimeError;
use std::cmp::Ordering;
use std::time::Instant;

/// Result of one scan pass, before any action runs.
struct Scan {
    committed: Vec<Match>,
    vetoed: usize,
    faults: Vec<(RuleId, MatchFault)>,
}

/// Runs a compiled rule set over documents. Holds no per-document state.
pub(crate) struct Runner<'a> {
    rules: &'a CompiledRules,
    step_limit: usize,
    composite_limit: usize,
}

impl<'a> Runner<'a> {
    pub fn new(rules: &'a CompiledRules, step_limit: usize, composite_limit: usize) -> Self {
        Runner { rules, step_limit, composite_limit }
    }

    pub fn run(&self, doc: &mut Document) -> RunMetrics {
        let total_start = Instant::now();
        let mut metrics = RunMetrics { rule_matches: vec![0; self.rules.rules.len()], ..RunMetrics::default() };
        let mut disabled = vec![false; self.rules.rules.len()];

        for stage in &self.rules.stages {
            let stage_metrics = self.run_stage(stage, doc, &mut disabled, &mut metrics.rule_matches);
            metrics.stages.push(stage_metrics);
        }

        metrics.total = total_start.elapsed();
        metrics
    }

    fn run_stage(
        &self,
        stage: &StageIndex,
        doc: &mut Document,
        disabled: &mut [bool],
        counts: &mut [usize],
    ) -> StageMetrics {
        let stage_start = Instant::now();
        log::debug!("stage {}: {} rules over {} tokens", stage.stage, stage.len(), doc.len());
        let mut metrics = StageMetrics { stage: stage.stage, ..StageMetrics::default() };
        let mut claimed = vec![false; doc.len()];

        // (0) filters
        let filters = self.filter_matches(&stage.filter, doc, disabled);
        let vetoes: Vec<Span> = filters.iter().map(|m| m.span).collect();
        metrics.filtered = filters.len();

        // (1) scan
        let scan_start = Instant::now();
        let scan = self.scan(&stage.text, &stage.tokens, doc, &vetoes, &claimed, &[], disabled);
        self.record_faults(&scan.faults, doc, disabled);
        claim(&mut claimed, &scan.committed);

        // (2) actions, filter matches interleaved by position
        let mut matches: Vec<Match> = filters.into_iter().chain(scan.committed).collect();
        matches.sort_by_key(|m| (m.span.start, self.rules.meta(m.rule).order));
        metrics.scan = PassMetrics {
            committed: matches.len() - metrics.filtered,
            vetoed: scan.vetoed,
            changed: self.execute(&matches, doc, counts),
            duration: scan_start.elapsed(),
        };

        // (3) composites
        if !stage.composite.is_empty() {
            let mut earlier: Vec<(RuleId, Span)> = Vec::new();
            for iteration in 0..self.composite_limit {
                let pass_start = Instant::now();
                let scan = self.scan(&[], &stage.composite, doc, &vetoes, &claimed, &earlier, disabled);
                self.record_faults(&scan.faults, doc, disabled);
                if scan.committed.is_empty() {
                    break;
                }
                earlier.extend(scan.committed.iter().map(|m| (m.rule, m.span)));
                log::debug!("stage {} composite iteration {}: {} matches", stage.stage, iteration, scan.committed.len());
                metrics.composite.push(PassMetrics {
                    committed: scan.committed.len(),
                    vetoed: scan.vetoed,
                    changed: self.execute(&scan.committed, doc, counts),
                    duration: pass_start.elapsed(),
                });
                if iteration + 1 == self.composite_limit {
                    log::warn!("stage {}: composite rules stopped at the limit of {} iterations", stage.stage, iteration + 1);
                }
            }
        }

        metrics.duration = stage_start.elapsed();
        metrics
    }

    /// Leftmost-longest matches of every filter rule.
    fn filter_matches(&self, filters: &[RuleId], doc: &mut Document, disabled: &mut [bool]) -> Vec<Match> {
        let mut found = Vec::new();
        let mut faults = Vec::new();
        for &id in filters {
            if disabled[id] {
                continue;
            }
            let Program::Tokens(program) = &self.rules.rules[id].program else { continue };
            match TokenMatcher::new(program, doc.tokens(), self.step_limit).find_all(id) {
                Ok(matches) => found.extend(matches),
                Err(fault) => faults.push((id, fault)),
            }
        }
        self.record_faults(&faults, doc, disabled);
        found
    }

    /// One left-to-right pass committing at most one match per position.
    ///
    /// `earlier` holds the composite matches of previous iterations; a
    /// candidate overlapping one of them must contain it and differ from it.
    #[allow(clippy::too_many_arguments)]
    fn scan(
        &self,
        text_rules: &[RuleId],
        token_rules: &[RuleId],
        doc: &Document,
        vetoes: &[Span],
        claimed: &[bool],
        earlier: &[(RuleId, Span)],
        disabled: &[bool],
    ) -> Scan {
        let mut by_start: Vec<Vec<Match>> = vec![Vec::new(); doc.len()];
        for &id in text_rules {
            if let Program::Text(program) = &self.rules.rules[id].program {
                for m in text_candidates(id, program, doc) {
                    by_start[m.span.start].push(m);
                }
            }
        }

        let mut live: Vec<RuleId> = token_rules.iter().copied().filter(|&id| !disabled[id]).collect();
        let mut scan = Scan { committed: Vec::new(), vetoed: 0, faults: Vec::new() };
        let mut pos = 0;

        while pos < doc.len() {
            if claimed[pos] {
                pos += 1;
                continue;
            }

            let mut candidates = std::mem::take(&mut by_start[pos]);
            live.retain(|&id| {
                let Program::Tokens(program) = &self.rules.rules[id].program else { return false };
                match TokenMatcher::new(program, doc.tokens(), self.step_limit).match_at(id, pos) {
                    Ok(found) => {
                        candidates.extend(found);
                        true
                    }
                    Err(fault) => {
                        scan.faults.push((id, fault));
                        false
                    }
                }
            });

            candidates.retain(|m| {
                if vetoes.iter().any(|v| v.overlaps(&m.span)) {
                    log::trace!("`{}` at {} vetoed by a filter", self.rules.meta(m.rule).name, m.span);
                    scan.vetoed += 1;
                    return false;
                }
                !claimed[m.span.start..m.span.end].iter().any(|&c| c)
                    && earlier.iter().all(|&(rule, span)| {
                        !span.overlaps(&m.span) || (m.span.contains(&span) && (rule, span) != (m.rule, m.span))
                    })
            });

            match candidates.into_iter().min_by(|a, b| self.preference(a, b)) {
                Some(m) => {
                    log::debug!("commit `{}` at {}: {:?}", self.rules.meta(m.rule).name, m.span, doc.span_text(m.span));
                    pos = m.span.end;
                    scan.committed.push(m);
                }
                None => pos += 1,
            }
        }
        scan
    }

    /// Higher priority, then longer span, then earlier declaration sorts first.
    fn preference(&self, a: &Match, b: &Match) -> Ordering {
        let (ma, mb) = (self.rules.meta(a.rule), self.rules.meta(b.rule));
        mb.priority
            .total_cmp(&ma.priority)
            .then_with(|| b.span.len().cmp(&a.span.len()))
            .then_with(|| ma.order.cmp(&mb.order))
    }

    fn execute(&self, matches: &[Match], doc: &mut Document, counts: &mut [usize]) -> usize {
        let mut changed = 0;
        for m in matches {
            counts[m.rule] += 1;
            changed += executor::execute(&self.rules.rules[m.rule], m, doc);
        }
        changed
    }

    fn record_faults(&self, faults: &[(RuleId, MatchFault)], doc: &mut Document, disabled: &mut [bool]) {
        for &(id, fault) in faults {
            disabled[id] = true;
            let rule = self.rules.meta(id).name.clone();
            log::warn!("rule `{rule}` skipped for this document: {fault}");
            doc.record(RuntimeError::Match { rule, message: fault.to_string() });
        }
    }
}

fn claim(claimed: &mut [bool], matches: &[Match]) {
    for m in matches {
        claimed[m.span.start..m.span.end].iter_mut().for_each(|c| *c = true);
    }
}
