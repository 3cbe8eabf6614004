//! Syntax tree for rules files.
//!
//! The parser produces a flat list of top-level [`Item`]s in source order.
//! Nothing here is resolved yet: `$Name` references, annotation-key names and
//! environment defaults are handled by the loader.

use crate::Value;
use crate::error::SourcePos;

/// A literal value (environment values, rule-record scalars, map-entry values).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Value(Value),
    /// `{ type: "CLASS", value: "…" }`
    Class(String),
    /// A bare identifier that is not `true`/`false`.
    Ident(String),
}

impl Literal {
    pub(crate) fn describe(&self) -> String {
        match self {
            Literal::Value(v) => format!("{v:?}"),
            Literal::Class(c) => format!("class reference {c:?}"),
            Literal::Ident(i) => format!("identifier `{i}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PatternExpr {
    /// `/…/`
    Regex { text: String, pos: SourcePos },
    /// `"…"`
    Text { text: String, pos: SourcePos },
    /// `[]`
    AnyToken,
    /// `[ {…} ]`
    Constraint(Constraint),
    /// `$Name`
    Var { name: String, pos: SourcePos },
    /// `( … )`
    Group(Box<PatternExpr>),
    Seq(Vec<PatternExpr>),
    Alt(Vec<Branch>),
    Repeat { inner: Box<PatternExpr>, min: usize, max: Option<usize>, greedy: bool },
}

/// One alternation branch; `value` is set for `pattern => value` map entries.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub pattern: PatternExpr,
    pub value: Option<Value>,
}

/// Boolean combination of per-token field tests inside `[ … ]`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Constraint {
    Field { key: String, test: FieldTest, pos: SourcePos },
    Not(Box<Constraint>),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldTest {
    Regex(String),
    Exact(String),
}

/// Argument of an action invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Arg {
    /// `$n`
    Group(usize),
    /// `$$n` optionally followed by `.field`
    GroupInfo { index: usize, field: Option<String> },
    Var(String),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActionCall {
    pub name: String,
    pub args: Vec<Arg>,
    pub pos: SourcePos,
}

/// Value of one rule-record field, shaped by its key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue {
    Pattern(PatternExpr),
    Action(Vec<ActionCall>),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RuleRecord {
    pub fields: Vec<(String, FieldValue, SourcePos)>,
    pub pos: SourcePos,
}

impl RuleRecord {
    pub(crate) fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _, _)| k == key).map(|(_, v, _)| v)
    }

    pub(crate) fn pos_of(&self, key: &str) -> SourcePos {
        self.fields.iter().find(|(k, _, _)| k == key).map(|(_, _, p)| *p).unwrap_or(self.pos)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    /// `ENV.<path> = <literal>`
    Env { path: Vec<String>, value: Literal, pos: SourcePos },
    /// `$Name = <pattern>`
    Binding { name: String, pattern: PatternExpr, pos: SourcePos },
    /// `name = <literal>` (annotation key class references)
    Assign { name: String, value: Literal, pos: SourcePos },
    Rule(RuleRecord),
}
