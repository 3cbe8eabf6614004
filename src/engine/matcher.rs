//! Token-pattern matcher and text-rule candidates.
//!
//! Token programs are matched by a backtracking walker in continuation-passing
//! style: every node calls its continuation once per way it can match, so the
//! walker enumerates all derivations at a start position and keeps the one
//! that ends furthest right. Derivations are produced in preference order
//! (earlier alternation branches first, greedy repeats longest-first), so the
//! first derivation reaching the best end wins ties.
//!
//! ```text
//! Seq [a, b]      walk(a, pos, |p| walk(b, p, k))
//! Alt [x, y]      walk(x, pos, k); walk(y, pos, k)
//! Group n (x)     walk(x, pos, |p| { groups[n] = pos..p; k(p) })
//! Repeat x{m,M}   greedy: one more x first, then stop; reluctant: the reverse
//! ```
//!
//! Repeats of a single-token pattern (`/w/+`, `(/w/)*`) count their run in a
//! loop instead of recursing once per token, so long runs cost no stack.
//!
//! The walk is bounded by a step budget per start position and by a nesting
//! depth; running out of either is a [`MatchFault`], which the runtime turns
//! into a per-document `RuntimeError::Match`.

use super::compiled_rules::RuleId;
use super::compiler::{Node, TextProgram, TokenProgram, TokenTest};
use crate::document::{Document, Token};
use crate::Span;
use std::fmt;

/// A captured group: the token span it covers and, for text rules, the exact
/// character range the regex group matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capture {
    pub tokens: Span,
    pub bytes: Option<(usize, usize)>,
}

impl Capture {
    pub fn text<'d>(&self, doc: &'d Document) -> &'d str {
        match self.bytes {
            Some((start, end)) => &doc.text()[start..end],
            None => doc.span_text(self.tokens),
        }
    }
}

/// A rule match: rule, token span, capture groups (slot 0 is the whole match)
/// and the map-entry value index of the branch that produced it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Match {
    pub rule: RuleId,
    pub span: Span,
    pub groups: Vec<Option<Capture>>,
    pub value: Option<usize>,
}

impl Match {
    pub fn group(&self, n: usize) -> Option<Capture> {
        self.groups.get(n).copied().flatten()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchFault {
    StepLimit(usize),
    DepthLimit(usize),
    /// Internal: a derivation reached the end of the input, nothing can beat it.
    Exhausted,
}

impl fmt::Display for MatchFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchFault::StepLimit(limit) => write!(f, "matcher exceeded the limit of {limit} steps"),
            MatchFault::DepthLimit(limit) => write!(f, "matcher exceeded the nesting limit of {limit}"),
            MatchFault::Exhausted => f.write_str("matcher stopped early"),
        }
    }
}

type Walk = Result<(), MatchFault>;

/// Nested `walk` frames allowed before the matcher gives up. Each level holds
/// a few stack frames, so this stays well inside a 2 MiB thread stack.
pub(crate) const DEPTH_LIMIT: usize = 512;

struct State {
    groups: Vec<Option<Span>>,
    value: Option<usize>,
    steps: usize,
    limit: usize,
    depth: usize,
}

impl State {
    fn tick(&mut self) -> Walk {
        self.steps += 1;
        if self.steps > self.limit { Err(MatchFault::StepLimit(self.limit)) } else { Ok(()) }
    }
}

struct Best {
    end: usize,
    groups: Vec<Option<Span>>,
    value: Option<usize>,
}

/// Walks one token program over one token sequence.
pub(crate) struct TokenMatcher<'a> {
    program: &'a TokenProgram,
    tokens: &'a [Token],
    step_limit: usize,
}

impl<'a> TokenMatcher<'a> {
    pub fn new(program: &'a TokenProgram, tokens: &'a [Token], step_limit: usize) -> Self {
        TokenMatcher { program, tokens, step_limit }
    }

    /// Longest non-empty match starting at token `start`.
    pub fn match_at(&self, rule: RuleId, start: usize) -> Result<Option<Match>, MatchFault> {
        let mut state =
            State { groups: vec![None; self.program.group_slots], value: None, steps: 0, limit: self.step_limit, depth: 0 };
        let mut best: Option<Best> = None;
        let len = self.tokens.len();

        let outcome = self.walk(&self.program.root, start, &mut state, &mut |end, st| {
            if end > start && best.as_ref().is_none_or(|b| end > b.end) {
                best = Some(Best { end, groups: st.groups.clone(), value: st.value });
                if end == len {
                    return Err(MatchFault::Exhausted);
                }
            }
            Ok(())
        });
        match outcome {
            Ok(()) | Err(MatchFault::Exhausted) => {}
            Err(fault) => return Err(fault),
        }

        Ok(best.map(|b| {
            let span = Span::new(start, b.end);
            let mut groups: Vec<Option<Capture>> =
                b.groups.into_iter().map(|g| g.map(|tokens| Capture { tokens, bytes: None })).collect();
            groups[0] = Some(Capture { tokens: span, bytes: None });
            Match { rule, span, groups, value: b.value }
        }))
    }

    /// Leftmost-longest, non-overlapping matches over the whole sequence.
    pub fn find_all(&self, rule: RuleId) -> Result<Vec<Match>, MatchFault> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos < self.tokens.len() {
            match self.match_at(rule, pos)? {
                Some(m) => {
                    pos = m.span.end;
                    found.push(m);
                }
                None => pos += 1,
            }
        }
        Ok(found)
    }

    fn walk(&self, node: &Node, pos: usize, st: &mut State, k: &mut dyn FnMut(usize, &mut State) -> Walk) -> Walk {
        st.tick()?;
        if st.depth >= DEPTH_LIMIT {
            return Err(MatchFault::DepthLimit(DEPTH_LIMIT));
        }
        // A fault abandons the whole walk, so depth is only restored on success.
        st.depth += 1;
        self.walk_node(node, pos, st, k)?;
        st.depth -= 1;
        Ok(())
    }

    fn walk_node(&self, node: &Node, pos: usize, st: &mut State, k: &mut dyn FnMut(usize, &mut State) -> Walk) -> Walk {
        match node {
            Node::Atom(test) => match self.tokens.get(pos) {
                Some(token) if test.matches(token) => k(pos + 1, st),
                _ => Ok(()),
            },
            Node::Seq(items) => self.walk_seq(items, pos, st, k),
            Node::Alt(branches) => {
                for (branch, value) in branches {
                    let saved = st.value;
                    if value.is_some() {
                        st.value = *value;
                    }
                    let result = self.walk(branch, pos, st, k);
                    st.value = saved;
                    result?;
                }
                Ok(())
            }
            Node::Group(index, inner) => {
                let index = *index;
                self.walk(inner, pos, st, &mut |end, st| {
                    let saved = st.groups[index];
                    st.groups[index] = Some(Span::new(pos, end));
                    let result = k(end, st);
                    st.groups[index] = saved;
                    result
                })
            }
            Node::Repeat { inner, min, max, greedy } => match single_token(inner) {
                Some((test, group)) => self.walk_run(test, group, *min, *max, *greedy, pos, st, k),
                None => self.walk_repeat(inner, *min, *max, *greedy, 0, pos, st, k),
            },
        }
    }

    /// Repeat of a one-token pattern: measure the run once, then offer each
    /// allowed length to the continuation in preference order.
    #[allow(clippy::too_many_arguments)]
    fn walk_run(
        &self,
        test: &TokenTest,
        group: Option<usize>,
        min: usize,
        max: Option<usize>,
        greedy: bool,
        pos: usize,
        st: &mut State,
        k: &mut dyn FnMut(usize, &mut State) -> Walk,
    ) -> Walk {
        let mut run = 0;
        while max.is_none_or(|m| run < m) {
            match self.tokens.get(pos + run) {
                Some(token) if test.matches(token) => {
                    st.tick()?;
                    run += 1;
                }
                _ => break,
            }
        }
        if run < min {
            return Ok(());
        }

        let mut offer = |n: usize, st: &mut State| -> Walk {
            let Some(index) = group else { return k(pos + n, st) };
            // The group holds its last iteration, and is untouched by zero.
            let saved = st.groups[index];
            if n > 0 {
                st.groups[index] = Some(Span::new(pos + n - 1, pos + n));
            }
            let result = k(pos + n, st);
            st.groups[index] = saved;
            result
        };
        if greedy {
            for n in (min..=run).rev() {
                offer(n, st)?;
            }
        } else {
            for n in min..=run {
                offer(n, st)?;
            }
        }
        Ok(())
    }

    fn walk_seq(&self, items: &[Node], pos: usize, st: &mut State, k: &mut dyn FnMut(usize, &mut State) -> Walk) -> Walk {
        match items.split_first() {
            None => k(pos, st),
            Some((first, rest)) => self.walk(first, pos, st, &mut |p, st| self.walk_seq(rest, p, st, k)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn walk_repeat(
        &self,
        inner: &Node,
        min: usize,
        max: Option<usize>,
        greedy: bool,
        count: usize,
        pos: usize,
        st: &mut State,
        k: &mut dyn FnMut(usize, &mut State) -> Walk,
    ) -> Walk {
        let can_stop = count >= min;
        let can_continue = max.is_none_or(|m| count < m);

        if !greedy && can_stop {
            k(pos, st)?;
        }
        if can_continue {
            self.walk(inner, pos, st, &mut |p, st| {
                // An empty iteration past the minimum would loop forever.
                if p == pos && count >= min {
                    return Ok(());
                }
                self.walk_repeat(inner, min, max, greedy, count + 1, p, st, k)
            })?;
        }
        if greedy && can_stop {
            k(pos, st)?;
        }
        Ok(())
    }
}

/// The token test and capture slot of a pattern that always consumes exactly
/// one token: an atom, optionally wrapped in a single capture group.
fn single_token(node: &Node) -> Option<(&TokenTest, Option<usize>)> {
    match node {
        Node::Atom(test) => Some((test, None)),
        Node::Group(index, inner) => match inner.as_ref() {
            Node::Atom(test) => Some((test, Some(*index))),
            _ => None,
        },
        _ => None,
    }
}

/// Candidates of a text rule, keyed by the start token of their covering span.
///
/// Every branch regex is run over the whole document text; each match is
/// mapped to the smallest token range covering it. Matches lying strictly
/// inside a single token, touching no token, or empty are dropped. Per start
/// token the longest candidate wins, then the longer character match, then
/// the earlier branch.
pub(crate) fn text_candidates(rule: RuleId, program: &TextProgram, doc: &Document) -> Vec<Match> {
    let mut best: Vec<Option<(Match, usize)>> = vec![None; doc.len()];

    for branch in &program.branches {
        for caps in branch.regex.captures_iter(doc.text()) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.is_empty() {
                continue;
            }
            let Some(span) = doc.covering_span(whole.start(), whole.end()) else { continue };
            if span.len() == 1 {
                let token = &doc.tokens()[span.start];
                if whole.start() != token.start() || whole.end() != token.end() {
                    log::trace!("rule {rule}: text match {:?} lies inside token {}", whole.as_str(), span.start);
                    continue;
                }
            }

            let mut groups: Vec<Option<Capture>> = vec![None; program.group_slots];
            for (slot, group) in caps.iter().enumerate() {
                if let Some(g) = group {
                    let covering = if g.is_empty() { None } else { doc.covering_span(g.start(), g.end()) };
                    let tokens = covering.unwrap_or(Span::new(span.start, span.start));
                    groups[slot] = Some(Capture { tokens, bytes: Some((g.start(), g.end())) });
                }
            }
            groups[0] = Some(Capture { tokens: span, bytes: Some((whole.start(), whole.end())) });

            let candidate = Match { rule, span, groups, value: branch.value };
            let chars = whole.len();
            let slot = &mut best[span.start];
            let better = match slot {
                None => true,
                Some((held, held_chars)) => (span.len(), chars) > (held.span.len(), *held_chars),
            };
            if better {
                *slot = Some((candidate, chars));
            }
        }
    }

    best.into_iter().flatten().map(|(m, _)| m).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn word(re: &str) -> Node {
        Node::Atom(TokenTest::Surface(Regex::new(&format!(r"\A(?:{re})\z")).unwrap()))
    }

    fn program(root: Node, group_slots: usize) -> TokenProgram {
        TokenProgram { root, group_slots }
    }

    fn run(p: &TokenProgram, words: &[&str], start: usize) -> Option<Match> {
        let doc = Document::from_words(words);
        TokenMatcher::new(p, doc.tokens(), 10_000).match_at(0, start).unwrap()
    }

    #[test]
    fn alternation_prefers_longest_then_first() {
        let p = program(
            Node::Alt(vec![
                (word("light"), Some(0)),
                (Node::Seq(vec![word("light"), word("blue")]), Some(1)),
                (Node::Seq(vec![word("light|pale"), word("blue")]), Some(2)),
            ]),
            1,
        );
        let m = run(&p, &["light", "blue", "sky"], 0).unwrap();
        assert_eq!(m.span, Span::new(0, 2));
        assert_eq!(m.value, Some(1));
    }

    #[test]
    fn groups_capture_their_token_spans() {
        // (/a/ (/b/)) /c/?
        let p = program(
            Node::Seq(vec![
                Node::Group(1, Box::new(Node::Seq(vec![word("a"), Node::Group(2, Box::new(word("b")))]))),
                Node::Repeat { inner: Box::new(word("c")), min: 0, max: Some(1), greedy: true },
            ]),
            3,
        );
        let m = run(&p, &["x", "a", "b", "c"], 1).unwrap();
        assert_eq!(m.span, Span::new(1, 4));
        assert_eq!(m.group(1).map(|c| c.tokens), Some(Span::new(1, 3)));
        assert_eq!(m.group(2).map(|c| c.tokens), Some(Span::new(2, 3)));
    }

    #[test]
    fn backtracks_into_repeats() {
        // []* /end/  must give back tokens to let /end/ match
        let p = program(
            Node::Seq(vec![
                Node::Repeat { inner: Box::new(Node::Atom(TokenTest::Any)), min: 0, max: None, greedy: true },
                word("end"),
            ]),
            1,
        );
        let m = run(&p, &["a", "b", "end", "c"], 0).unwrap();
        assert_eq!(m.span, Span::new(0, 3));
    }

    #[test]
    fn reluctant_repeat_still_yields_longest_overall() {
        let p = program(
            Node::Repeat { inner: Box::new(word("a")), min: 1, max: None, greedy: false },
            1,
        );
        assert_eq!(run(&p, &["a", "a", "a", "b"], 0).unwrap().span, Span::new(0, 3));
    }

    #[test]
    fn bounded_repeats_and_empty_iterations() {
        let p = program(Node::Repeat { inner: Box::new(word("a")), min: 2, max: Some(3), greedy: true }, 1);
        assert_eq!(run(&p, &["a"], 0), None);
        assert_eq!(run(&p, &["a", "a", "a", "a"], 0).unwrap().span, Span::new(0, 3));

        // (/a/?)* terminates and zero-length matches are not reported.
        let nested = program(
            Node::Repeat {
                inner: Box::new(Node::Repeat { inner: Box::new(word("a")), min: 0, max: Some(1), greedy: true }),
                min: 0,
                max: None,
                greedy: true,
            },
            1,
        );
        assert_eq!(run(&nested, &["b"], 0), None);
        assert_eq!(run(&nested, &["a", "a", "b"], 0).unwrap().span, Span::new(0, 2));
    }

    #[test]
    fn step_limit_faults() {
        // ([]*)* /x/ over a long miss explodes combinatorially.
        let any = Node::Repeat { inner: Box::new(Node::Atom(TokenTest::Any)), min: 0, max: None, greedy: true };
        let p = program(
            Node::Seq(vec![Node::Repeat { inner: Box::new(any), min: 0, max: None, greedy: true }, word("x")]),
            1,
        );
        let words = vec!["a"; 30];
        let doc = Document::from_words(&words);
        let fault = TokenMatcher::new(&p, doc.tokens(), 1_000).match_at(0, 0).unwrap_err();
        assert_eq!(fault, MatchFault::StepLimit(1_000));
    }

    #[test]
    fn long_single_token_runs_match_without_recursion() {
        let words = vec!["w"; 50_000];
        let doc = Document::from_words(&words);

        let plain = program(Node::Repeat { inner: Box::new(word("w")), min: 1, max: None, greedy: true }, 1);
        let m = TokenMatcher::new(&plain, doc.tokens(), 100_000).match_at(0, 0).unwrap().unwrap();
        assert_eq!(m.span, Span::new(0, 50_000));

        // (/w/)+? keeps the last iteration in its group.
        let grouped = program(
            Node::Repeat { inner: Box::new(Node::Group(1, Box::new(word("w")))), min: 1, max: None, greedy: false },
            2,
        );
        let m = TokenMatcher::new(&grouped, doc.tokens(), 100_000).match_at(0, 0).unwrap().unwrap();
        assert_eq!(m.span, Span::new(0, 50_000));
        assert_eq!(m.group(1).map(|c| c.tokens), Some(Span::new(49_999, 50_000)));
    }

    #[test]
    fn deep_nesting_faults_instead_of_overflowing() {
        // (/w/ /w/)+ recurses once per iteration.
        let pair = Node::Group(1, Box::new(Node::Seq(vec![word("w"), word("w")])));
        let p = program(Node::Repeat { inner: Box::new(pair), min: 1, max: None, greedy: true }, 2);
        let words = vec!["w"; 50_000];
        let doc = Document::from_words(&words);
        let fault = TokenMatcher::new(&p, doc.tokens(), 100_000).match_at(0, 0).unwrap_err();
        assert_eq!(fault, MatchFault::DepthLimit(DEPTH_LIMIT));

        // Short runs of the same pattern stay well inside the limit.
        let short = Document::from_words(&["w", "w", "w", "w", "w"]);
        let m = TokenMatcher::new(&p, short.tokens(), 100_000).match_at(0, 0).unwrap().unwrap();
        assert_eq!(m.span, Span::new(0, 4));
    }

    #[test]
    fn find_all_is_leftmost_longest_and_disjoint() {
        let p = program(Node::Repeat { inner: Box::new(word("a")), min: 1, max: None, greedy: true }, 1);
        let doc = Document::from_words(&["a", "a", "b", "a"]);
        let spans: Vec<Span> =
            TokenMatcher::new(&p, doc.tokens(), 10_000).find_all(0).unwrap().into_iter().map(|m| m.span).collect();
        assert_eq!(spans, vec![Span::new(0, 2), Span::new(3, 4)]);
    }
}
