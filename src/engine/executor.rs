//! Action executor.
//!
//! Action clauses are checked and resolved at load time into [`ActionOp`]s:
//! annotation-key names go through the key registry, group references are
//! checked against the program's capture slots, and `$$0.value` is only
//! allowed when the pattern carries map-entry values.
//!
//! At run time each committed match executes its ops in textual order. A
//! failing op is recorded on the document as `RuntimeError::Action` and the
//! remaining ops of the clause still run.

use super::compiled_rules::CompiledRule;
use super::compiler::CompileFault;
use super::keys::{AnnotationKey, KeyRegistry};
use super::matcher::Match;
use crate::document::Document;
use crate::error::{RuntimeError, SourcePos};
use crate::syntax::ast::{ActionCall, Arg, Literal};
use crate::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ActionOp {
    /// `Annotate($n, key, value)`
    Annotate { group: usize, key: AnnotationKey, value: ValueExpr },
}

/// Value argument of an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueExpr {
    Literal(Value),
    /// Text covered by a capture group (`$n` or `$$n.text`).
    GroupText(usize),
    /// The associated map-entry value (`$$0.value`).
    MapValue,
}

// --- Load time ---------------------------------------------------------------

pub(crate) fn compile_actions(
    calls: &[ActionCall],
    group_slots: usize,
    has_values: bool,
    keys: &mut KeyRegistry,
) -> Result<Vec<ActionOp>, CompileFault> {
    calls.iter().map(|call| compile_call(call, group_slots, has_values, keys)).collect()
}

fn compile_call(
    call: &ActionCall,
    group_slots: usize,
    has_values: bool,
    keys: &mut KeyRegistry,
) -> Result<ActionOp, CompileFault> {
    let pos = Some(call.pos);
    let compile = |message: String| CompileFault::Compile(pos, message);

    if call.name != "Annotate" {
        return Err(compile(format!("unknown action `{}` (only `Annotate` is supported)", call.name)));
    }
    let [span, key, value] = call.args.as_slice() else {
        return Err(compile(format!("`Annotate` takes 3 arguments (span, key, value), got {}", call.args.len())));
    };

    let group = match span {
        Arg::Group(n) | Arg::GroupInfo { index: n, field: None } => *n,
        other => return Err(compile(format!("`Annotate` span must be a group reference like `$0`, found {other:?}"))),
    };
    check_group(group, group_slots, pos)?;

    let key = match key {
        Arg::Literal(Literal::Ident(name)) | Arg::Literal(Literal::Value(Value::Str(name))) => match keys.get(name) {
            Some(key) => key,
            None => {
                return Err(CompileFault::Resolution(pos, format!("unknown annotation key `{name}`")));
            }
        },
        Arg::Literal(Literal::Class(class)) => keys.get_class(class).unwrap_or_else(|| keys.bind(class, class)),
        other => return Err(compile(format!("`Annotate` key must be an annotation key name, found {other:?}"))),
    };

    let value = match value {
        Arg::Literal(Literal::Value(v)) => ValueExpr::Literal(v.clone()),
        Arg::Group(n) => {
            check_group(*n, group_slots, pos)?;
            ValueExpr::GroupText(*n)
        }
        Arg::GroupInfo { index: 0, field } if matches!(field.as_deref(), None | Some("value")) => {
            if !has_values {
                return Err(compile("`$$0.value` used but the pattern has no `=>` map-entry values".to_string()));
            }
            ValueExpr::MapValue
        }
        Arg::GroupInfo { index, field: Some(field) } if field == "text" => {
            check_group(*index, group_slots, pos)?;
            ValueExpr::GroupText(*index)
        }
        Arg::GroupInfo { index, field } => {
            let field = field.as_deref().unwrap_or("value");
            return Err(compile(format!("`$${index}.{field}` is not supported (use `$$0.value` or `$${index}.text`)")));
        }
        Arg::Var(name) => {
            return Err(CompileFault::Resolution(pos, format!("`${name}` cannot be used as an action value")));
        }
        Arg::Literal(Literal::Ident(name)) => {
            return Err(CompileFault::Resolution(pos, format!("unresolved identifier `{name}` (quote literal values)")));
        }
        Arg::Literal(Literal::Class(_)) => {
            return Err(compile("a class reference cannot be used as an annotation value".to_string()));
        }
    };

    Ok(ActionOp::Annotate { group, key, value })
}

fn check_group(group: usize, group_slots: usize, pos: Option<SourcePos>) -> Result<(), CompileFault> {
    if group < group_slots {
        Ok(())
    } else {
        Err(CompileFault::Compile(pos, format!("group `${group}` does not exist (pattern has {} groups)", group_slots - 1)))
    }
}

// --- Run time ----------------------------------------------------------------

/// Run the action clause of `m`. Returns how many annotations changed.
pub(crate) fn execute(rule: &CompiledRule, m: &Match, doc: &mut Document) -> usize {
    let mut changed = 0;
    for (index, op) in rule.actions.iter().enumerate() {
        match apply(op, rule, m, doc) {
            Ok(n) => changed += n,
            Err(message) => {
                log::warn!("rule `{}` action #{index} at {}: {message}", rule.meta.name, m.span);
                doc.record(RuntimeError::Action { rule: rule.meta.name.clone(), index, message });
            }
        }
    }
    changed
}

fn apply(op: &ActionOp, rule: &CompiledRule, m: &Match, doc: &mut Document) -> Result<usize, String> {
    let ActionOp::Annotate { group, key, value } = op;

    let target = m.group(*group).ok_or_else(|| format!("group `${group}` did not participate in the match"))?;
    if target.tokens.is_empty() {
        return Err(format!("target span `${group}` is empty"));
    }

    let value = match value {
        ValueExpr::Literal(v) => v.clone(),
        ValueExpr::GroupText(n) => {
            let capture = m.group(*n).ok_or_else(|| format!("group `${n}` did not participate in the match"))?;
            Value::Str(capture.text(doc).to_string())
        }
        ValueExpr::MapValue => m
            .value
            .and_then(|index| rule.values.get(index))
            .cloned()
            .ok_or_else(|| "match carries no map-entry value".to_string())?,
    };

    let mut changed = 0;
    for token in &mut doc.tokens_mut()[target.tokens.start..target.tokens.end] {
        if token.set(*key, value.clone()) {
            changed += 1;
        }
    }
    log::trace!("`{}` set {} = {value:?} on {}", rule.meta.name, key, target.tokens);
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(args: Vec<Arg>) -> ActionCall {
        ActionCall { name: "Annotate".into(), args, pos: SourcePos { line: 3, column: 1 } }
    }

    fn ident(name: &str) -> Arg {
        Arg::Literal(Literal::Ident(name.into()))
    }

    fn text(s: &str) -> Arg {
        Arg::Literal(Literal::Value(Value::from(s)))
    }

    fn registry() -> KeyRegistry {
        let mut keys = KeyRegistry::new();
        keys.bind("ner", "NER");
        keys
    }

    #[test]
    fn compiles_value_forms() {
        let mut keys = registry();
        let ner = keys.get("ner").unwrap();
        let calls = vec![
            call(vec![Arg::Group(0), ident("ner"), text("COLOR")]),
            call(vec![Arg::Group(1), ident("ner"), Arg::GroupInfo { index: 0, field: Some("value".into()) }]),
            call(vec![Arg::Group(0), ident("ner"), Arg::GroupInfo { index: 1, field: Some("text".into()) }]),
        ];
        let ops = compile_actions(&calls, 2, true, &mut keys).unwrap();
        assert_eq!(
            ops,
            vec![
                ActionOp::Annotate { group: 0, key: ner, value: ValueExpr::Literal(Value::from("COLOR")) },
                ActionOp::Annotate { group: 1, key: ner, value: ValueExpr::MapValue },
                ActionOp::Annotate { group: 0, key: ner, value: ValueExpr::GroupText(1) },
            ]
        );
    }

    #[test]
    fn rejects_bad_calls() {
        let mut keys = registry();
        let cases = vec![
            (call(vec![Arg::Group(2), ident("ner"), text("x")]), "does not exist"),
            (call(vec![Arg::Group(0), ident("tag"), text("x")]), "unknown annotation key `tag`"),
            (call(vec![Arg::Group(0), ident("ner")]), "takes 3 arguments"),
            (call(vec![Arg::Group(0), ident("ner"), Arg::GroupInfo { index: 0, field: None }]), "no `=>`"),
            (call(vec![Arg::Group(0), ident("ner"), Arg::GroupInfo { index: 1, field: Some("value".into()) }]), "$$1.value"),
        ];
        for (c, expected) in cases {
            let err = compile_actions(&[c], 2, false, &mut keys).unwrap_err();
            let message = match err {
                CompileFault::Compile(_, m) | CompileFault::Resolution(_, m) => m,
            };
            assert!(message.contains(expected), "{message:?} should mention {expected:?}");
        }

        let mut unknown = call(vec![]);
        unknown.name = "Remove".into();
        assert!(compile_actions(&[unknown], 1, false, &mut keys).is_err());
    }

    #[test]
    fn inline_class_reference_creates_a_key() {
        let mut keys = registry();
        let calls = vec![call(vec![Arg::Group(0), Arg::Literal(Literal::Class("POS".into())), text("NN")])];
        compile_actions(&calls, 1, false, &mut keys).unwrap();
        assert!(keys.get_class("POS").is_some());
    }
}
