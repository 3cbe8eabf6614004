//! Rules-file parser.
//!
//! Recursive descent over the lexeme stream produced by `lexer.rs`.
//!
//! ```text
//! file      := item*
//! item      := 'ENV' ('.' ident | '[' string ']')+ '=' literal
//!            | '$' ident '=' pattern
//!            | ident '=' literal
//!            | '{' (key ':' field ','?)* '}'
//! pattern   := branch ('|' branch)*
//! branch    := seq ('=>' literal)?          -- map entry, must end the branch
//! seq       := quantified+
//! quantified:= atom ('?' | '*' | '+' | '{' n (',' m?)? '}')  '?'?
//! atom      := regex | string | '$' ident | '(' pattern ')' | '[' constraint? ']'
//! action    := call | '(' call (',' call)* ')'
//! ```
//!
//! On a syntax error the parser records it and skips to the next top-level
//! item, so a single load reports every independent problem.

use super::ast::{ActionCall, Arg, Branch, Constraint, FieldTest, FieldValue, Item, Literal, PatternExpr, RuleRecord};
use super::lexer::{Lexeme, Tok};
use crate::Value;
use crate::error::SourcePos;

/// Keys accepted inside a rule record.
pub(crate) const RULE_KEYS: &[&str] = &["ruleType", "pattern", "action", "priority", "stage", "name"];

pub(crate) type ParseError = (SourcePos, String);

type PResult<T> = Result<T, ParseError>;

pub(crate) struct Parser<'a> {
    lexemes: &'a [Lexeme],
    idx: usize,
    eof: SourcePos,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(lexemes: &'a [Lexeme], eof: SourcePos) -> Self {
        Parser { lexemes, idx: 0, eof }
    }

    /// Parse every top-level item, collecting errors.
    pub(crate) fn parse_file(mut self) -> (Vec<Item>, Vec<ParseError>) {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        while self.idx < self.lexemes.len() {
            let start = self.idx;
            match self.item() {
                Ok(item) => items.push(item),
                Err(err) => {
                    errors.push(err);
                    self.recover(start);
                }
            }
        }
        (items, errors)
    }

    // --- cursor helpers ---------------------------------------------------------

    fn peek(&self) -> Option<&'a Tok> {
        self.lexemes.get(self.idx).map(|l| &l.tok)
    }

    fn peek_at(&self, n: usize) -> Option<&'a Tok> {
        self.lexemes.get(self.idx + n).map(|l| &l.tok)
    }

    fn pos(&self) -> SourcePos {
        self.lexemes.get(self.idx).map(|l| l.pos).unwrap_or(self.eof)
    }

    fn bump(&mut self) -> Option<&'a Lexeme> {
        let lexeme = self.lexemes.get(self.idx)?;
        self.idx += 1;
        Some(lexeme)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> PResult<()> {
        if self.eat(tok) { Ok(()) } else { Err(self.unexpected(&format!("expected {}", tok.describe()))) }
    }

    /// Consume an identifier or quoted string used as a name.
    fn name(&mut self, what: &str) -> PResult<String> {
        match self.peek() {
            Some(Tok::Ident(s)) | Some(Tok::Str(s)) => {
                self.idx += 1;
                Ok(s.clone())
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(tok) => (self.pos(), format!("{what}, found {}", tok.describe())),
            None => (self.pos(), format!("{what}, found end of input")),
        }
    }

    /// Skip past the failed item: stop at the first lexeme that starts a line
    /// at nesting depth zero and can begin a new item.
    fn recover(&mut self, start: usize) {
        let mut depth: i64 = 0;
        let mut i = start;
        while i < self.lexemes.len() {
            let lexeme = &self.lexemes[i];
            if i > start && lexeme.line_start && depth <= 0 {
                let starts_item = match &lexeme.tok {
                    Tok::LBrace => true,
                    Tok::Var(_) | Tok::Ident(_) => {
                        matches!(self.lexemes.get(i + 1).map(|l| &l.tok), Some(Tok::Eq) | Some(Tok::Dot))
                    }
                    _ => false,
                };
                if starts_item {
                    break;
                }
            }
            match lexeme.tok {
                Tok::LBrace | Tok::LParen | Tok::LBracket => depth += 1,
                Tok::RBrace | Tok::RParen | Tok::RBracket => depth -= 1,
                _ => {}
            }
            i += 1;
        }
        self.idx = i.max(start + 1);
    }

    // --- items ----------------------------------------------------------------

    fn item(&mut self) -> PResult<Item> {
        let pos = self.pos();
        match self.peek() {
            Some(Tok::Ident(name)) if name == "ENV" && self.peek_at(1) != Some(&Tok::Eq) => {
                self.bump();
                self.env_item(pos)
            }
            Some(Tok::Var(name)) => {
                self.bump();
                self.expect(&Tok::Eq)?;
                let pattern = self.pattern_value()?;
                Ok(Item::Binding { name: name.clone(), pattern, pos })
            }
            Some(Tok::Ident(name)) => {
                self.bump();
                self.expect(&Tok::Eq)?;
                let value = self.literal()?;
                Ok(Item::Assign { name: name.clone(), value, pos })
            }
            Some(Tok::LBrace) => self.rule_record().map(Item::Rule),
            _ => Err(self.unexpected("expected `ENV.…`, `$Name =`, a key assignment or a rule record")),
        }
    }

    fn env_item(&mut self, pos: SourcePos) -> PResult<Item> {
        let mut path = Vec::new();
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.bump();
                    path.push(self.name("expected an environment key after `.`")?);
                }
                Some(Tok::LBracket) => {
                    self.bump();
                    path.push(self.name("expected a quoted key inside `[…]`")?);
                    self.expect(&Tok::RBracket)?;
                }
                _ => break,
            }
        }
        if path.is_empty() {
            return Err(self.unexpected("expected `.` after `ENV`"));
        }
        self.expect(&Tok::Eq)?;
        let value = self.literal()?;
        Ok(Item::Env { path, value, pos })
    }

    fn rule_record(&mut self) -> PResult<RuleRecord> {
        let pos = self.pos();
        self.expect(&Tok::LBrace)?;
        let mut fields: Vec<(String, FieldValue, SourcePos)> = Vec::new();
        loop {
            if self.eat(&Tok::RBrace) {
                break;
            }
            let key_pos = self.pos();
            let key = self.name("expected a rule-record key or `}`")?;
            if !RULE_KEYS.contains(&key.as_str()) {
                return Err((key_pos, format!("unknown rule-record key `{key}` (expected one of {})", RULE_KEYS.join(", "))));
            }
            if fields.iter().any(|(k, _, _)| *k == key) {
                return Err((key_pos, format!("duplicate rule-record key `{key}`")));
            }
            self.expect(&Tok::Colon)?;
            let value = match key.as_str() {
                "pattern" => FieldValue::Pattern(self.pattern_value()?),
                "action" => FieldValue::Action(self.action()?),
                _ => FieldValue::Literal(self.literal()?),
            };
            fields.push((key, value, key_pos));
            if !self.eat(&Tok::Comma) && self.peek() != Some(&Tok::RBrace) {
                return Err(self.unexpected("expected `,` or `}` after rule-record field"));
            }
        }
        Ok(RuleRecord { fields, pos })
    }

    // --- literals -------------------------------------------------------------

    fn literal(&mut self) -> PResult<Literal> {
        let pos = self.pos();
        let lit = match self.peek() {
            Some(Tok::Str(s)) => Literal::Value(Value::Str(s.clone())),
            Some(Tok::Int(n)) => Literal::Value(Value::Int(*n)),
            Some(Tok::Float(n)) => Literal::Value(Value::Float(*n)),
            Some(Tok::Ident(id)) if id == "true" || id == "TRUE" => Literal::Value(Value::Bool(true)),
            Some(Tok::Ident(id)) if id == "false" || id == "FALSE" => Literal::Value(Value::Bool(false)),
            Some(Tok::Ident(id)) => Literal::Ident(id.clone()),
            Some(Tok::LBrace) => return self.class_object(),
            Some(Tok::FatArrow) => {
                return Err((pos, "map-entry `=>` is only allowed inside a pattern alternation".to_string()));
            }
            _ => return Err(self.unexpected("expected a literal")),
        };
        self.bump();
        if self.peek() == Some(&Tok::FatArrow) {
            return Err((self.pos(), "map-entry `=>` is only allowed inside a pattern alternation".to_string()));
        }
        Ok(lit)
    }

    /// `{ type: "CLASS", value: "…" }`
    fn class_object(&mut self) -> PResult<Literal> {
        let pos = self.pos();
        self.expect(&Tok::LBrace)?;
        let mut kind: Option<String> = None;
        let mut value: Option<String> = None;
        while !self.eat(&Tok::RBrace) {
            let key = self.name("expected `type` or `value`")?;
            self.expect(&Tok::Colon)?;
            let text = self.name("expected a string")?;
            match key.as_str() {
                "type" => kind = Some(text),
                "value" => value = Some(text),
                other => return Err((pos, format!("unknown field `{other}` in class reference"))),
            }
            self.eat(&Tok::Comma);
        }
        match (kind.as_deref(), value) {
            (Some(k), Some(v)) if k.eq_ignore_ascii_case("CLASS") => Ok(Literal::Class(v)),
            (Some(k), _) if !k.eq_ignore_ascii_case("CLASS") => {
                Err((pos, format!("unsupported object type `{k}` (only `CLASS` is recognized)")))
            }
            _ => Err((pos, "class reference needs both `type` and `value`".to_string())),
        }
    }

    // --- patterns ---------------------------------------------------------------

    /// A pattern in value position. Parentheses that wrap the whole
    /// expression delimit it and do not open a capture group.
    fn pattern_value(&mut self) -> PResult<PatternExpr> {
        match self.pattern()? {
            PatternExpr::Group(inner) => Ok(*inner),
            other => Ok(other),
        }
    }

    fn pattern(&mut self) -> PResult<PatternExpr> {
        let mut branches = vec![self.branch()?];
        while self.eat(&Tok::Pipe) {
            branches.push(self.branch()?);
        }
        if branches.len() == 1 && branches[0].value.is_none() {
            return Ok(branches.remove(0).pattern);
        }
        Ok(PatternExpr::Alt(branches))
    }

    fn branch(&mut self) -> PResult<Branch> {
        let pattern = self.seq()?;
        if !self.eat(&Tok::FatArrow) {
            return Ok(Branch { pattern, value: None });
        }
        let pos = self.pos();
        let value = match self.peek() {
            Some(Tok::Str(s)) => Value::Str(s.clone()),
            Some(Tok::Int(n)) => Value::Int(*n),
            Some(Tok::Float(n)) => Value::Float(*n),
            Some(Tok::Ident(id)) if id == "true" => Value::Bool(true),
            Some(Tok::Ident(id)) if id == "false" => Value::Bool(false),
            _ => return Err((pos, "map-entry value after `=>` must be a string, number or boolean".to_string())),
        };
        self.bump();
        if self.at_atom_start() || self.peek() == Some(&Tok::FatArrow) {
            return Err((self.pos(), "malformed map-entry: `pattern => value` must end its alternation branch".to_string()));
        }
        Ok(Branch { pattern, value: Some(value) })
    }

    fn at_atom_start(&self) -> bool {
        match self.peek() {
            Some(Tok::Regex(_)) | Some(Tok::Str(_)) | Some(Tok::LParen) | Some(Tok::LBracket) => true,
            // `$Name =` starts the next binding, not a reference.
            Some(Tok::Var(_)) => self.peek_at(1) != Some(&Tok::Eq),
            _ => false,
        }
    }

    fn seq(&mut self) -> PResult<PatternExpr> {
        let mut items = Vec::new();
        while self.at_atom_start() {
            items.push(self.quantified()?);
        }
        match items.len() {
            0 => Err(self.unexpected("expected a pattern")),
            1 => Ok(items.remove(0)),
            _ => Ok(PatternExpr::Seq(items)),
        }
    }

    fn quantified(&mut self) -> PResult<PatternExpr> {
        let atom = self.atom()?;
        let (min, max) = match self.peek() {
            Some(Tok::Question) => (0, Some(1)),
            Some(Tok::Star) => (0, None),
            Some(Tok::Plus) => (1, None),
            Some(Tok::LBrace) if matches!(self.peek_at(1), Some(Tok::Int(_))) => {
                self.bump();
                let (min, max) = self.bounds()?;
                return Ok(self.finish_repeat(atom, min, max));
            }
            _ => return Ok(atom),
        };
        self.bump();
        Ok(self.finish_repeat(atom, min, max))
    }

    fn finish_repeat(&mut self, inner: PatternExpr, min: usize, max: Option<usize>) -> PatternExpr {
        let greedy = !self.eat(&Tok::Question);
        PatternExpr::Repeat { inner: Box::new(inner), min, max, greedy }
    }

    /// `n}`, `n,}` or `n,m}` (opening brace already consumed).
    fn bounds(&mut self) -> PResult<(usize, Option<usize>)> {
        let pos = self.pos();
        let min = self.count()?;
        let max = if self.eat(&Tok::Comma) {
            if matches!(self.peek(), Some(Tok::Int(_))) { Some(self.count()?) } else { None }
        } else {
            Some(min)
        };
        self.expect(&Tok::RBrace)?;
        if max.is_some_and(|m| m < min) {
            return Err((pos, format!("quantifier upper bound is smaller than lower bound {min}")));
        }
        Ok((min, max))
    }

    fn count(&mut self) -> PResult<usize> {
        match self.peek() {
            Some(Tok::Int(n)) if *n >= 0 => {
                let n = *n as usize;
                self.bump();
                Ok(n)
            }
            _ => Err(self.unexpected("expected a non-negative repetition count")),
        }
    }

    fn atom(&mut self) -> PResult<PatternExpr> {
        let pos = self.pos();
        match self.peek() {
            Some(Tok::Regex(text)) => {
                self.bump();
                Ok(PatternExpr::Regex { text: text.clone(), pos })
            }
            Some(Tok::Str(text)) => {
                self.bump();
                Ok(PatternExpr::Text { text: text.clone(), pos })
            }
            Some(Tok::Var(name)) => {
                self.bump();
                Ok(PatternExpr::Var { name: name.clone(), pos })
            }
            Some(Tok::LParen) => {
                self.bump();
                let inner = self.pattern()?;
                self.expect(&Tok::RParen)?;
                Ok(PatternExpr::Group(Box::new(inner)))
            }
            Some(Tok::LBracket) => {
                self.bump();
                if self.eat(&Tok::RBracket) {
                    return Ok(PatternExpr::AnyToken);
                }
                let constraint = self.constraint_or()?;
                self.expect(&Tok::RBracket)?;
                Ok(PatternExpr::Constraint(constraint))
            }
            _ => Err(self.unexpected("expected a pattern")),
        }
    }

    // --- token constraints ------------------------------------------------------

    fn constraint_or(&mut self) -> PResult<Constraint> {
        let mut parts = vec![self.constraint_and()?];
        while self.eat(&Tok::Pipe) {
            parts.push(self.constraint_and()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Constraint::Or(parts) })
    }

    fn constraint_and(&mut self) -> PResult<Constraint> {
        let mut parts = vec![self.constraint_unary()?];
        while self.eat(&Tok::Amp) {
            parts.push(self.constraint_unary()?);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { Constraint::And(parts) })
    }

    fn constraint_unary(&mut self) -> PResult<Constraint> {
        match self.peek() {
            Some(Tok::Bang) => {
                self.bump();
                Ok(Constraint::Not(Box::new(self.constraint_unary()?)))
            }
            Some(Tok::LParen) => {
                self.bump();
                let inner = self.constraint_or()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBrace) => self.constraint_fields(),
            _ => Err(self.unexpected("expected `{`, `!` or `(` in token constraint")),
        }
    }

    fn constraint_fields(&mut self) -> PResult<Constraint> {
        self.expect(&Tok::LBrace)?;
        let mut fields = Vec::new();
        while !self.eat(&Tok::RBrace) {
            let pos = self.pos();
            let key = self.name("expected a token field name")?;
            self.expect(&Tok::Colon)?;
            let test = match self.peek() {
                Some(Tok::Regex(re)) => FieldTest::Regex(re.clone()),
                Some(Tok::Str(s)) => FieldTest::Exact(s.clone()),
                _ => return Err(self.unexpected("expected a regex or string field test")),
            };
            self.bump();
            fields.push(Constraint::Field { key, test, pos });
            if !self.eat(&Tok::Comma) && self.peek() != Some(&Tok::RBrace) {
                return Err(self.unexpected("expected `,` or `}` in token constraint"));
            }
        }
        match fields.len() {
            0 => Err((self.pos(), "empty token constraint `{}`".to_string())),
            1 => Ok(fields.remove(0)),
            _ => Ok(Constraint::And(fields)),
        }
    }

    // --- actions ----------------------------------------------------------------

    fn action(&mut self) -> PResult<Vec<ActionCall>> {
        if !self.eat(&Tok::LParen) {
            return Ok(vec![self.call()?]);
        }
        let mut calls = vec![self.call()?];
        while self.eat(&Tok::Comma) {
            if self.peek() == Some(&Tok::RParen) {
                break;
            }
            calls.push(self.call()?);
        }
        self.expect(&Tok::RParen)?;
        Ok(calls)
    }

    fn call(&mut self) -> PResult<ActionCall> {
        let pos = self.pos();
        let name = match self.peek() {
            Some(Tok::Ident(name)) => name.clone(),
            _ => return Err(self.unexpected("expected an action name")),
        };
        self.bump();
        self.expect(&Tok::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                args.push(self.arg()?);
                if self.eat(&Tok::RParen) {
                    break;
                }
                self.expect(&Tok::Comma)?;
            }
        }
        Ok(ActionCall { name, args, pos })
    }

    fn arg(&mut self) -> PResult<Arg> {
        match self.peek() {
            Some(Tok::Group(n)) => {
                self.bump();
                Ok(Arg::Group(*n))
            }
            Some(Tok::GroupInfo(n)) => {
                self.bump();
                let field = if self.eat(&Tok::Dot) { Some(self.name("expected a field name after `.`")?) } else { None };
                Ok(Arg::GroupInfo { index: *n, field })
            }
            Some(Tok::Var(name)) => {
                self.bump();
                Ok(Arg::Var(name.clone()))
            }
            _ => self.literal().map(Arg::Literal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lexer::lex;

    fn parse(src: &str) -> (Vec<Item>, Vec<ParseError>) {
        let (lexemes, lex_errors) = lex(src);
        assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
        Parser::new(&lexemes, SourcePos::default()).parse_file()
    }

    fn parse_ok(src: &str) -> Vec<Item> {
        let (items, errors) = parse(src);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        items
    }

    fn regex(text: &str) -> PatternExpr {
        PatternExpr::Regex { text: text.to_string(), pos: SourcePos::default() }
    }

    /// Positions are irrelevant for structural comparisons.
    fn strip(p: PatternExpr) -> PatternExpr {
        match p {
            PatternExpr::Regex { text, .. } => regex(&text),
            PatternExpr::Text { text, .. } => PatternExpr::Text { text, pos: SourcePos::default() },
            PatternExpr::Var { name, .. } => PatternExpr::Var { name, pos: SourcePos::default() },
            PatternExpr::Group(inner) => PatternExpr::Group(Box::new(strip(*inner))),
            PatternExpr::Seq(items) => PatternExpr::Seq(items.into_iter().map(strip).collect()),
            PatternExpr::Alt(branches) => PatternExpr::Alt(
                branches.into_iter().map(|b| Branch { pattern: strip(b.pattern), value: b.value }).collect(),
            ),
            PatternExpr::Repeat { inner, min, max, greedy } => {
                PatternExpr::Repeat { inner: Box::new(strip(*inner)), min, max, greedy }
            }
            other => other,
        }
    }

    #[test]
    fn parses_env_and_key_assignments() {
        let items = parse_ok(
            r#"ENV.defaultStringPatternFlags = 2
ENV.defaults["ruleType"] = "tokens"
ner = { type: "CLASS", value: "a.b$NamedEntityTagAnnotation" }"#,
        );
        assert_eq!(items.len(), 3);
        match &items[0] {
            Item::Env { path, value, .. } => {
                assert_eq!(path, &vec!["defaultStringPatternFlags".to_string()]);
                assert_eq!(value, &Literal::Value(Value::Int(2)));
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &items[1] {
            Item::Env { path, .. } => assert_eq!(path, &vec!["defaults".to_string(), "ruleType".to_string()]),
            other => panic!("unexpected item {other:?}"),
        }
        match &items[2] {
            Item::Assign { name, value, .. } => {
                assert_eq!(name, "ner");
                assert_eq!(value, &Literal::Class("a.b$NamedEntityTagAnnotation".into()));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn map_entry_alternation_with_group_branch() {
        let items = parse_ok(
            r##"$Colors = (
  /red/ => "#FF0000" |
  (/pale|light/) /blue/ => "#ADD8E6"
)"##,
        );
        let Item::Binding { name, pattern, .. } = &items[0] else { panic!("expected binding") };
        assert_eq!(name, "Colors");
        assert_eq!(
            strip(pattern.clone()),
            PatternExpr::Alt(vec![
                Branch { pattern: regex("red"), value: Some(Value::Str("#FF0000".into())) },
                Branch {
                    pattern: PatternExpr::Seq(vec![PatternExpr::Group(Box::new(regex("pale|light"))), regex("blue")]),
                    value: Some(Value::Str("#ADD8E6".into())),
                },
            ])
        );
    }

    #[test]
    fn consecutive_bindings_do_not_merge() {
        let items = parse_ok("$A = /a/\n$B = $A /b/");
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn quantifiers() {
        let items = parse_ok("$A = /a/? /b/{2,3} []*? /c/{2,}");
        let Item::Binding { pattern, .. } = &items[0] else { panic!() };
        let PatternExpr::Seq(parts) = strip(pattern.clone()) else { panic!("expected sequence") };
        let shapes: Vec<(usize, Option<usize>, bool)> = parts
            .iter()
            .map(|p| match p {
                PatternExpr::Repeat { min, max, greedy, .. } => (*min, *max, *greedy),
                other => panic!("expected repeat, got {other:?}"),
            })
            .collect();
        assert_eq!(shapes, vec![(0, Some(1), true), (2, Some(3), true), (0, None, false), (2, None, true)]);
    }

    #[test]
    fn parses_rule_record_with_composite_action() {
        let items = parse_ok(
            r#"{ruleType: "tokens", pattern: ( $Colors ), priority: 2,
 action: ( Annotate($0, ner, "COLOR"), Annotate($0, normalized, $$0.value ) ) }"#,
        );
        let Item::Rule(rule) = &items[0] else { panic!("expected rule") };
        match rule.get("pattern") {
            Some(FieldValue::Pattern(PatternExpr::Var { name, .. })) => assert_eq!(name, "Colors"),
            other => panic!("unexpected pattern {other:?}"),
        }
        let Some(FieldValue::Action(calls)) = rule.get("action") else { panic!("expected action") };
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args[2], Arg::GroupInfo { index: 0, field: Some("value".into()) });
        assert_eq!(rule.get("priority"), Some(&FieldValue::Literal(Literal::Value(Value::Int(2)))));
    }

    #[test]
    fn token_constraints() {
        let items = parse_ok(r#"$A = [ {word: /foo/, ner: "X"} | !{ner: /O/} ]"#);
        let Item::Binding { pattern: PatternExpr::Constraint(c), .. } = &items[0] else { panic!() };
        assert!(matches!(c, Constraint::Or(parts) if parts.len() == 2));
    }

    #[test]
    fn unknown_rule_key_is_an_error() {
        let (_, errors) = parse(r#"{ruleType: "text", pattren: /x/, action: Annotate($0, ner, "x")}"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("unknown rule-record key `pattren`"));
    }

    #[test]
    fn map_entry_must_end_branch() {
        let (_, errors) = parse(r#"$A = ( /a/ => "x" /b/ | /c/ )"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("malformed map-entry"));
    }

    #[test]
    fn map_entry_outside_pattern_is_an_error() {
        let (_, errors) = parse(r#"{ruleType: "tokens" => "x", pattern: /a/, action: Annotate($0, ner, "x")}"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("only allowed inside a pattern alternation"));
    }

    #[test]
    fn recovers_after_an_error() {
        let (items, errors) = parse(
            r#"{ruleType: "text", bogus: 1}
$A = /a/
{ruleType: "text", pattern: /b/, action: Annotate($0, ner, "B") }
$B = ( /x/ "#,
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn outer_parens_do_not_capture_but_inner_ones_do() {
        let items = parse_ok("$A = ( (/a/) /b/ )\n$B = (/a/) /b/");
        let Item::Binding { pattern: a, .. } = &items[0] else { panic!() };
        let Item::Binding { pattern: b, .. } = &items[1] else { panic!() };
        assert_eq!(strip(a.clone()), strip(b.clone()));
        assert!(matches!(a, PatternExpr::Seq(parts) if matches!(parts[0], PatternExpr::Group(_))));
    }
}
