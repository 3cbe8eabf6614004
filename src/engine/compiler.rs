//! Pattern compiler.
//!
//! Turns the expanded pattern of each `RuleDecl` into a matcher program:
//!
//! - `text` rules compile to a [`TextProgram`]: one character regex per
//!   alternation branch, with the declaration's default flags applied. The
//!   runtime picks the longest branch match at each position.
//! - every other rule type compiles to a [`TokenProgram`]: a tree of token
//!   tests, sequences, alternations, capture groups and repeats that
//!   `matcher.rs` walks with backtracking.
//!
//! Capture groups are numbered here, over the expanded tree, in order of their
//! opening parenthesis; slot 0 is always the whole match. Map-entry values are
//! moved into a per-rule value table and referenced by index.

use super::compiled_rules::{CompiledRule, RuleMeta, RuleType};
use super::executor;
use super::flags::PatternFlags;
use super::keys::{AnnotationKey, KeyRegistry};
use super::loader::RuleDecl;
use crate::document::Token;
use crate::error::{LoadError, SourcePos};
use crate::syntax::ast::{Constraint, FieldTest, PatternExpr};
use crate::Value;
use regex::{Regex, RegexBuilder};

/// A load-time failure before it is tied to its rule.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompileFault {
    Compile(Option<SourcePos>, String),
    Resolution(Option<SourcePos>, String),
}

impl CompileFault {
    pub fn into_load_error(self, meta: &RuleMeta) -> LoadError {
        let source_name = meta.source_name.clone();
        match self {
            CompileFault::Compile(pos, message) => {
                LoadError::Compile { source_name, pos: pos.unwrap_or(meta.pos), rule: meta.name.clone(), message }
            }
            CompileFault::Resolution(pos, message) => {
                LoadError::Resolution { source_name, pos: pos.unwrap_or(meta.pos), message }
            }
        }
    }
}

type CResult<T> = Result<T, CompileFault>;

#[derive(Debug)]
pub(crate) enum Program {
    Text(TextProgram),
    Tokens(TokenProgram),
}

impl Program {
    /// Number of capture slots, including slot 0.
    pub fn group_slots(&self) -> usize {
        match self {
            Program::Text(p) => p.group_slots,
            Program::Tokens(p) => p.group_slots,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TextProgram {
    pub branches: Vec<TextBranch>,
    pub group_slots: usize,
}

#[derive(Debug)]
pub(crate) struct TextBranch {
    pub regex: Regex,
    pub value: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct TokenProgram {
    pub root: Node,
    pub group_slots: usize,
}

#[derive(Debug)]
pub(crate) enum Node {
    /// Consumes exactly one token.
    Atom(TokenTest),
    Seq(Vec<Node>),
    /// Branches in declaration order, each with an optional value-table index.
    Alt(Vec<(Node, Option<usize>)>),
    Group(usize, Box<Node>),
    Repeat { inner: Box<Node>, min: usize, max: Option<usize>, greedy: bool },
}

/// Single-token predicate.
#[derive(Debug)]
pub(crate) enum TokenTest {
    Any,
    Surface(Regex),
    Annotation(AnnotationKey, Regex),
    Not(Box<TokenTest>),
    All(Vec<TokenTest>),
    AnyOf(Vec<TokenTest>),
}

impl TokenTest {
    pub fn matches(&self, token: &Token) -> bool {
        match self {
            TokenTest::Any => true,
            TokenTest::Surface(re) => re.is_match(token.text()),
            TokenTest::Annotation(key, re) => match token.get(*key) {
                Some(Value::Str(s)) => re.is_match(s),
                Some(other) => re.is_match(&other.to_string()),
                None => false,
            },
            TokenTest::Not(inner) => !inner.matches(token),
            TokenTest::All(parts) => parts.iter().all(|p| p.matches(token)),
            TokenTest::AnyOf(parts) => parts.iter().any(|p| p.matches(token)),
        }
    }
}

/// Compile one declaration (pattern and action clause).
pub(crate) fn compile_rule(decl: RuleDecl, keys: &mut KeyRegistry) -> Result<CompiledRule, LoadError> {
    let RuleDecl { meta, pattern, actions, flags } = decl;

    let mut compiler = Compiler { flags, keys: &*keys, next_group: 1, values: Vec::new() };
    let program = match meta.rule_type {
        RuleType::Text => compiler.text_program(&pattern).map(Program::Text),
        RuleType::Tokens | RuleType::Composite | RuleType::Filter => {
            compiler.token_program(&pattern).map(Program::Tokens)
        }
    }
    .map_err(|fault| fault.into_load_error(&meta))?;
    let values = compiler.values;

    let actions = executor::compile_actions(&actions, program.group_slots(), !values.is_empty(), keys)
        .map_err(|fault| fault.into_load_error(&meta))?;

    log::trace!("compiled rule `{}`: {} groups, {} values", meta.name, program.group_slots() - 1, values.len());
    Ok(CompiledRule { meta, program, values, actions })
}

struct Compiler<'a> {
    flags: PatternFlags,
    keys: &'a KeyRegistry,
    next_group: usize,
    values: Vec<Value>,
}

impl Compiler<'_> {
    fn push_value(&mut self, value: Option<&Value>) -> Option<usize> {
        let value = value?;
        self.values.push(value.clone());
        Some(self.values.len() - 1)
    }

    // --- character regexes ------------------------------------------------------

    fn build_regex(&self, text: &str, pos: SourcePos) -> CResult<Regex> {
        let mut builder = RegexBuilder::new(text);
        self.flags.configure(&mut builder);
        builder.build().map_err(|err| CompileFault::Compile(Some(pos), format!("invalid regex: {err}")))
    }

    /// Regex tested against a whole token surface or annotation value.
    fn token_regex(&self, text: &str, pos: SourcePos) -> CResult<Regex> {
        // In whitespace mode a trailing `#` comment would swallow the anchor.
        let sep = if self.flags.contains(PatternFlags::COMMENTS) { "\n" } else { "" };
        self.build_regex(&format!(r"\A(?:{text}{sep})\z"), pos)
    }

    // --- text rules -------------------------------------------------------------

    fn text_program(&mut self, pattern: &PatternExpr) -> CResult<TextProgram> {
        let branches: Vec<(&PatternExpr, Option<&Value>)> = match pattern {
            PatternExpr::Alt(branches) => branches.iter().map(|b| (&b.pattern, b.value.as_ref())).collect(),
            other => vec![(other, None)],
        };

        let mut compiled = Vec::with_capacity(branches.len());
        let mut group_slots = 1;
        for (branch, value) in branches {
            let regex = match branch {
                PatternExpr::Regex { text, pos } => self.build_regex(text, *pos)?,
                PatternExpr::Text { text, pos } => self.build_regex(&regex::escape(text), *pos)?,
                _ => {
                    return Err(CompileFault::Compile(
                        None,
                        "text rules take a regex, a string or an alternation of them; \
                         use ruleType \"tokens\" for token patterns"
                            .to_string(),
                    ));
                }
            };
            group_slots = group_slots.max(regex.captures_len());
            let value = self.push_value(value);
            compiled.push(TextBranch { regex, value });
        }
        Ok(TextProgram { branches: compiled, group_slots })
    }

    // --- token rules ------------------------------------------------------------

    fn token_program(&mut self, pattern: &PatternExpr) -> CResult<TokenProgram> {
        let root = self.node(pattern)?;
        Ok(TokenProgram { root, group_slots: self.next_group })
    }

    fn node(&mut self, pattern: &PatternExpr) -> CResult<Node> {
        match pattern {
            PatternExpr::Regex { text, pos } => Ok(Node::Atom(TokenTest::Surface(self.token_regex(text, *pos)?))),
            PatternExpr::Text { text, pos } => {
                Ok(Node::Atom(TokenTest::Surface(self.token_regex(&regex::escape(text), *pos)?)))
            }
            PatternExpr::AnyToken => Ok(Node::Atom(TokenTest::Any)),
            PatternExpr::Constraint(c) => Ok(Node::Atom(self.constraint(c)?)),
            PatternExpr::Var { name, pos } => {
                Err(CompileFault::Resolution(Some(*pos), format!("unresolved reference `${name}`")))
            }
            PatternExpr::Group(inner) => {
                let index = self.next_group;
                self.next_group += 1;
                Ok(Node::Group(index, Box::new(self.node(inner)?)))
            }
            PatternExpr::Seq(items) => Ok(Node::Seq(items.iter().map(|p| self.node(p)).collect::<CResult<_>>()?)),
            PatternExpr::Alt(branches) => {
                let mut compiled = Vec::with_capacity(branches.len());
                for branch in branches {
                    let node = self.node(&branch.pattern)?;
                    compiled.push((node, self.push_value(branch.value.as_ref())));
                }
                Ok(Node::Alt(compiled))
            }
            PatternExpr::Repeat { inner, min, max, greedy } => Ok(Node::Repeat {
                inner: Box::new(self.node(inner)?),
                min: *min,
                max: *max,
                greedy: *greedy,
            }),
        }
    }

    fn constraint(&mut self, constraint: &Constraint) -> CResult<TokenTest> {
        match constraint {
            Constraint::Field { key, test, pos } => {
                let regex = match test {
                    FieldTest::Regex(text) => self.token_regex(text, *pos)?,
                    FieldTest::Exact(text) => self.token_regex(&regex::escape(text), *pos)?,
                };
                match key.as_str() {
                    "word" | "text" => Ok(TokenTest::Surface(regex)),
                    name => match self.keys.get(name) {
                        Some(key) => Ok(TokenTest::Annotation(key, regex)),
                        None => Err(CompileFault::Resolution(
                            Some(*pos),
                            format!("unknown annotation key `{name}` in token constraint"),
                        )),
                    },
                }
            }
            Constraint::Not(inner) => Ok(TokenTest::Not(Box::new(self.constraint(inner)?))),
            Constraint::And(parts) => {
                Ok(TokenTest::All(parts.iter().map(|p| self.constraint(p)).collect::<CResult<_>>()?))
            }
            Constraint::Or(parts) => {
                Ok(TokenTest::AnyOf(parts.iter().map(|p| self.constraint(p)).collect::<CResult<_>>()?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loader::Loader;
    use crate::syntax::parse_source;

    const KEYS: &str = "ner = { type: \"CLASS\", value: \"NER\" }\n";

    fn compile(src: &str) -> Result<CompiledRule, LoadError> {
        let text = format!("{KEYS}{src}");
        let mut loader = Loader::new();
        loader.load_file("t.rules", parse_source("t.rules", &text).expect("test rules parse"));
        let (mut decls, mut keys, errors) = loader.finish();
        assert!(errors.is_empty(), "test rules resolve: {errors:?}");
        compile_rule(decls.remove(0), &mut keys)
    }

    fn token_rule(pattern: &str) -> CompiledRule {
        compile(&format!("{{ ruleType: \"tokens\", pattern: {pattern}, action: Annotate($0, ner, \"X\") }}"))
            .expect("rule compiles")
    }

    fn group_indexes(node: &Node, out: &mut Vec<usize>) {
        match node {
            Node::Atom(_) => {}
            Node::Seq(items) => items.iter().for_each(|n| group_indexes(n, out)),
            Node::Alt(branches) => branches.iter().for_each(|(n, _)| group_indexes(n, out)),
            Node::Group(index, inner) => {
                out.push(*index);
                group_indexes(inner, out);
            }
            Node::Repeat { inner, .. } => group_indexes(inner, out),
        }
    }

    #[test]
    fn groups_follow_opening_paren_order_after_expansion() {
        let rule = compile(&format!(
            "$Inner = ( (/b/) /c/ )\n{{ ruleType: \"tokens\", pattern: ( (/a/ ($Inner)) (/d/) ), \
             action: Annotate($0, ner, \"X\") }}"
        ))
        .unwrap();
        let Program::Tokens(program) = &rule.program else { panic!("expected a token program") };
        let mut order = Vec::new();
        group_indexes(&program.root, &mut order);
        // (/a/ ($Inner)) = 1, ($Inner) = 2, (/b/) inside the binding = 3, (/d/) = 4
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(program.group_slots, 5);
    }

    #[test]
    fn token_regexes_are_anchored_and_flagged() {
        let rule = compile(
            "ENV.defaultStringPatternFlags = 2\n\
             { ruleType: \"tokens\", pattern: /red/, action: Annotate($0, ner, \"X\") }",
        )
        .unwrap();
        let Program::Tokens(TokenProgram { root: Node::Atom(TokenTest::Surface(re)), .. }) = &rule.program else {
            panic!("expected a single surface atom")
        };
        assert!(re.is_match("Red"));
        assert!(!re.is_match("redder"));
    }

    #[test]
    fn whitespace_flag_keeps_anchor() {
        let rule = compile(
            "ENV.defaultStringPatternFlags = \"x\"\n\
             { ruleType: \"tokens\", pattern: /a b # letters/, action: Annotate($0, ner, \"X\") }",
        )
        .unwrap();
        let Program::Tokens(TokenProgram { root: Node::Atom(TokenTest::Surface(re)), .. }) = &rule.program else {
            panic!("expected a single surface atom")
        };
        assert!(re.is_match("ab"));
        assert!(!re.is_match("abc"));
    }

    #[test]
    fn map_entry_values_go_to_the_value_table() {
        let rule = token_rule(r##"( /red/ => "#FF0000" | /blue/ | /green/ => "#00FF00" )"##);
        assert_eq!(rule.values, vec![Value::from("#FF0000"), Value::from("#00FF00")]);
        let Program::Tokens(TokenProgram { root: Node::Alt(branches), .. }) = &rule.program else {
            panic!("expected an alternation")
        };
        let indexes: Vec<Option<usize>> = branches.iter().map(|(_, v)| *v).collect();
        assert_eq!(indexes, vec![Some(0), None, Some(1)]);
    }

    #[test]
    fn text_rule_slots_cover_the_widest_branch() {
        let rule = compile(
            r#"{ ruleType: "text", pattern: ( /(a)(b)/ => "ab" | "c" => "c" ), action: Annotate($2, ner, "X") }"#,
        )
        .unwrap();
        let Program::Text(program) = &rule.program else { panic!("expected a text program") };
        assert_eq!(program.branches.len(), 2);
        assert_eq!(program.group_slots, 3);
        assert!(program.branches[1].regex.is_match("xcx"));
    }

    #[test]
    fn text_rule_rejects_token_syntax() {
        let err = compile(r#"{ ruleType: "text", pattern: /a/ [], action: Annotate($0, ner, "X") }"#).unwrap_err();
        assert!(err.is_compile());
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let err = compile(r#"{ ruleType: "tokens", pattern: /a(/, name: "broken", action: Annotate($0, ner, "X") }"#)
            .unwrap_err();
        match err {
            LoadError::Compile { rule, pos, .. } => {
                assert_eq!(rule, "broken");
                assert_eq!(pos.line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn constraints_resolve_annotation_keys() {
        let rule = token_rule(r#"[ {word: /x/} & !{ner: "O"} ]"#);
        let Program::Tokens(TokenProgram { root: Node::Atom(TokenTest::All(parts)), .. }) = &rule.program else {
            panic!("expected a conjunction")
        };
        assert!(matches!(parts[1], TokenTest::Not(_)));

        let err = compile(r#"{ ruleType: "tokens", pattern: [ {pos: /NN/} ], action: Annotate($0, ner, "X") }"#)
            .unwrap_err();
        assert!(matches!(err, LoadError::Resolution { ref message, .. } if message.contains("`pos`")));
    }
}
