//! Rules-file lexer.
//!
//! Turns rules source text into a flat list of [`Lexeme`]s. The lexer owns
//! every context that the parser cannot recover from tokens alone:
//!
//! - line comments (`#…` and `//…`) are dropped,
//! - block comments (`/* … */`) are rejected with a dedicated diagnostic,
//! - regex literals (`/…/`, `\` escapes) and quoted strings are read whole,
//! - `$Name`, `$n` and `$$n` references are classified.
//!
//! Lexing never stops at the first problem; errors are collected and the
//! lexer resynchronises at the end of the offending line (or after the
//! closing `*/` of a block comment).

use crate::error::SourcePos;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Ident(String),
    /// `$Name`
    Var(String),
    /// `$n`
    Group(usize),
    /// `$$n`
    GroupInfo(usize),
    Regex(String),
    Str(String),
    Int(i64),
    Float(f64),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Eq,
    FatArrow,
    Pipe,
    Amp,
    Bang,
    Question,
    Star,
    Plus,
    Dot,
}

impl Tok {
    pub(crate) fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier `{s}`"),
            Tok::Var(s) => format!("`${s}`"),
            Tok::Group(n) => format!("`${n}`"),
            Tok::GroupInfo(n) => format!("`$${n}`"),
            Tok::Regex(s) => format!("regex `/{s}/`"),
            Tok::Str(s) => format!("string {s:?}"),
            Tok::Int(n) => format!("integer {n}"),
            Tok::Float(n) => format!("number {n}"),
            Tok::LBrace => "`{`".into(),
            Tok::RBrace => "`}`".into(),
            Tok::LParen => "`(`".into(),
            Tok::RParen => "`)`".into(),
            Tok::LBracket => "`[`".into(),
            Tok::RBracket => "`]`".into(),
            Tok::Comma => "`,`".into(),
            Tok::Colon => "`:`".into(),
            Tok::Eq => "`=`".into(),
            Tok::FatArrow => "`=>`".into(),
            Tok::Pipe => "`|`".into(),
            Tok::Amp => "`&`".into(),
            Tok::Bang => "`!`".into(),
            Tok::Question => "`?`".into(),
            Tok::Star => "`*`".into(),
            Tok::Plus => "`+`".into(),
            Tok::Dot => "`.`".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lexeme {
    pub tok: Tok,
    pub pos: SourcePos,
    /// First lexeme on its line.
    pub line_start: bool,
}

pub(crate) type LexError = (SourcePos, String);

pub(crate) const BLOCK_COMMENT_MESSAGE: &str =
    "block comments (`/* … */`) are not supported; use `#` or `//` line comments";

struct Cursor {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn new(src: &str) -> Self {
        Cursor { chars: src.chars().collect(), idx: 0, line: 1, column: 1 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.idx + n).copied()
    }

    fn pos(&self) -> SourcePos {
        SourcePos { line: self.line, column: self.column }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Lex `src` into lexemes, collecting every error found.
pub(crate) fn lex(src: &str) -> (Vec<Lexeme>, Vec<LexError>) {
    let mut cur = Cursor::new(src);
    let mut out: Vec<Lexeme> = Vec::new();
    let mut errors: Vec<LexError> = Vec::new();
    let mut last_line = 0;

    while let Some(c) = cur.peek() {
        if c.is_whitespace() {
            cur.bump();
            continue;
        }
        if c == '#' {
            cur.skip_line();
            continue;
        }

        let pos = cur.pos();
        let line_start = pos.line != last_line;
        let tok = match c {
            '/' => match cur.peek_at(1) {
                Some('/') => {
                    cur.skip_line();
                    continue;
                }
                Some('*') => {
                    errors.push((pos, BLOCK_COMMENT_MESSAGE.to_string()));
                    skip_block_comment(&mut cur);
                    continue;
                }
                // A placeholder keeps the parser from reporting follow-on errors.
                _ => match lex_regex(&mut cur) {
                    Ok(tok) => tok,
                    Err(msg) => {
                        errors.push((pos, msg));
                        cur.skip_line();
                        Tok::Regex(String::new())
                    }
                },
            },
            '"' => match lex_string(&mut cur) {
                Ok(tok) => tok,
                Err(msg) => {
                    errors.push((pos, msg));
                    cur.skip_line();
                    Tok::Str(String::new())
                }
            },
            '$' => match lex_reference(&mut cur) {
                Ok(tok) => tok,
                Err(msg) => {
                    errors.push((pos, msg));
                    continue;
                }
            },
            c if c.is_ascii_digit() => lex_number(&mut cur, false),
            '-' if cur.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                cur.bump();
                lex_number(&mut cur, true)
            }
            c if is_ident_start(c) => Tok::Ident(cur.take_while(is_ident_continue)),
            _ => {
                cur.bump();
                match c {
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    ',' => Tok::Comma,
                    ':' => Tok::Colon,
                    '|' => Tok::Pipe,
                    '&' => Tok::Amp,
                    '!' => Tok::Bang,
                    '?' => Tok::Question,
                    '*' => Tok::Star,
                    '+' => Tok::Plus,
                    '.' => Tok::Dot,
                    '=' => {
                        if cur.peek() == Some('>') {
                            cur.bump();
                            Tok::FatArrow
                        } else {
                            Tok::Eq
                        }
                    }
                    other => {
                        errors.push((pos, format!("unexpected character '{other}'")));
                        continue;
                    }
                }
            }
        };

        last_line = pos.line;
        out.push(Lexeme { tok, pos, line_start });
    }

    (out, errors)
}

fn skip_block_comment(cur: &mut Cursor) {
    cur.bump();
    cur.bump();
    while let Some(c) = cur.bump() {
        if c == '*' && cur.peek() == Some('/') {
            cur.bump();
            return;
        }
    }
}

/// `/…/`: `\/` is an escaped delimiter, every other escape is kept verbatim
/// for the regex compiler.
fn lex_regex(cur: &mut Cursor) -> Result<Tok, String> {
    cur.bump();
    let mut body = String::new();
    loop {
        match cur.peek() {
            None | Some('\n') => return Err("unterminated regex literal".to_string()),
            Some('/') => {
                cur.bump();
                return Ok(Tok::Regex(body));
            }
            Some('\\') => {
                cur.bump();
                match cur.peek() {
                    None | Some('\n') => return Err("unterminated regex literal".to_string()),
                    Some('/') => {
                        cur.bump();
                        body.push('/');
                    }
                    Some(other) => {
                        cur.bump();
                        body.push('\\');
                        body.push(other);
                    }
                }
            }
            Some(other) => {
                cur.bump();
                body.push(other);
            }
        }
    }
}

fn lex_string(cur: &mut Cursor) -> Result<Tok, String> {
    cur.bump();
    let mut body = String::new();
    loop {
        match cur.bump() {
            None | Some('\n') => return Err("unterminated string literal".to_string()),
            Some('"') => return Ok(Tok::Str(body)),
            Some('\\') => match cur.bump() {
                Some('n') => body.push('\n'),
                Some('t') => body.push('\t'),
                Some('r') => body.push('\r'),
                Some('0') => body.push('\0'),
                Some('u') => {
                    let hex: String = (0..4).filter_map(|_| cur.bump()).collect();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| format!("invalid unicode escape `\\u{hex}`"))?;
                    body.push(ch);
                }
                Some(other) if other != '\n' => body.push(other),
                _ => return Err("unterminated string literal".to_string()),
            },
            Some(other) => body.push(other),
        }
    }
}

fn lex_reference(cur: &mut Cursor) -> Result<Tok, String> {
    cur.bump();
    match cur.peek() {
        Some('$') => {
            cur.bump();
            let digits = cur.take_while(|c| c.is_ascii_digit());
            digits.parse().map(Tok::GroupInfo).map_err(|_| "expected a group number after `$$`".to_string())
        }
        Some(c) if c.is_ascii_digit() => {
            let digits = cur.take_while(|c| c.is_ascii_digit());
            digits.parse().map(Tok::Group).map_err(|_| format!("group number `{digits}` is too large"))
        }
        Some(c) if is_ident_start(c) => Ok(Tok::Var(cur.take_while(is_ident_continue))),
        _ => Err("expected a variable name or group number after `$`".to_string()),
    }
}

fn lex_number(cur: &mut Cursor, negative: bool) -> Tok {
    let mut text = cur.take_while(|c| c.is_ascii_digit());
    let is_float = cur.peek() == Some('.') && cur.peek_at(1).is_some_and(|c| c.is_ascii_digit());
    if is_float {
        cur.bump();
        text.push('.');
        text.push_str(&cur.take_while(|c| c.is_ascii_digit()));
    }
    let sign = if negative { -1.0 } else { 1.0 };
    if is_float {
        return Tok::Float(sign * text.parse::<f64>().unwrap_or(0.0));
    }
    match text.parse::<i64>() {
        Ok(n) => Tok::Int(if negative { -n } else { n }),
        Err(_) => Tok::Float(sign * text.parse::<f64>().unwrap_or(f64::MAX)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        let (lexemes, errors) = lex(src);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        lexemes.into_iter().map(|l| l.tok).collect()
    }

    #[test]
    fn lexes_rule_record() {
        let got = toks(r#"{ruleType: "text", pattern: /\bfoo\b/, action: ( Annotate($0, ner, "foo_ner") ) }"#);
        assert_eq!(
            got,
            vec![
                Tok::LBrace,
                Tok::Ident("ruleType".into()),
                Tok::Colon,
                Tok::Str("text".into()),
                Tok::Comma,
                Tok::Ident("pattern".into()),
                Tok::Colon,
                Tok::Regex(r"\bfoo\b".into()),
                Tok::Comma,
                Tok::Ident("action".into()),
                Tok::Colon,
                Tok::LParen,
                Tok::Ident("Annotate".into()),
                Tok::LParen,
                Tok::Group(0),
                Tok::Comma,
                Tok::Ident("ner".into()),
                Tok::Comma,
                Tok::Str("foo_ner".into()),
                Tok::RParen,
                Tok::RParen,
                Tok::RBrace,
            ]
        );
    }

    #[test]
    fn skips_line_comments() {
        let got = toks("# heading\n// note /* not a block */\nENV.x = 2 # trailing\n");
        assert_eq!(got, vec![Tok::Ident("ENV".into()), Tok::Dot, Tok::Ident("x".into()), Tok::Eq, Tok::Int(2)]);
    }

    #[test]
    fn rejects_block_comments() {
        let (lexemes, errors) = lex("/* one\n two */ $A = /a/");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("block comments"));
        assert_eq!(errors[0].0, SourcePos { line: 1, column: 1 });
        assert_eq!(lexemes.len(), 3);
    }

    #[test]
    fn unterminated_regex_is_reported_and_skipped() {
        let (lexemes, errors) = lex("$A = /abc\n$B = /b/");
        assert_eq!(errors, vec![(SourcePos { line: 1, column: 6 }, "unterminated regex literal".to_string())]);
        let regexes: Vec<&Tok> = lexemes.iter().map(|l| &l.tok).filter(|t| matches!(t, Tok::Regex(_))).collect();
        assert_eq!(regexes, vec![&Tok::Regex(String::new()), &Tok::Regex("b".into())]);
    }

    #[test]
    fn regex_escapes() {
        assert_eq!(toks(r"/a\/b\d/"), vec![Tok::Regex(r"a/b\d".into())]);
    }

    #[test]
    fn references_and_numbers() {
        assert_eq!(
            toks("$Colors $0 $$0.value -3 2.5"),
            vec![
                Tok::Var("Colors".into()),
                Tok::Group(0),
                Tok::GroupInfo(0),
                Tok::Dot,
                Tok::Ident("value".into()),
                Tok::Int(-3),
                Tok::Float(2.5),
            ]
        );
    }

    #[test]
    fn marks_line_starts() {
        let (lexemes, _) = lex("$A = /a/\n  /b/");
        let starts: Vec<bool> = lexemes.iter().map(|l| l.line_start).collect();
        assert_eq!(starts, vec![true, false, false, true]);
    }

    #[test]
    fn fat_arrow_and_string_escapes() {
        assert_eq!(
            toks(r##"/red/ => "#FF\"00A""##),
            vec![Tok::Regex("red".into()), Tok::FatArrow, Tok::Str("#FF\"00A".into())]
        );
    }
}
