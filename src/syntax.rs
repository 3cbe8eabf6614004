//! Rules-file syntax: lexing and parsing.
//!
//! ```text
//! source text ── lex (lexer.rs) ──▶ lexemes ── Parser (parser.rs) ──▶ Vec<Item>
//! ```
//!
//! Both stages collect errors instead of stopping at the first one. The
//! loader (`engine/loader.rs`) then resolves the items into a rule set.

#[path = "syntax/ast.rs"]
pub(crate) mod ast;
#[path = "syntax/lexer.rs"]
pub(crate) mod lexer;
#[path = "syntax/parser.rs"]
pub(crate) mod parser;

use crate::error::{LoadError, SourcePos};

/// Parse one rules file into top-level items.
pub(crate) fn parse_source(source_name: &str, text: &str) -> Result<Vec<ast::Item>, Vec<LoadError>> {
    let (lexemes, lex_errors) = lexer::lex(text);
    let eof = end_position(text);
    let (items, parse_errors) = parser::Parser::new(&lexemes, eof).parse_file();

    let mut errors: Vec<(SourcePos, String)> = lex_errors;
    errors.extend(parse_errors);
    if errors.is_empty() {
        log::debug!("parsed {source_name}: {} items", items.len());
        return Ok(items);
    }

    errors.sort_by_key(|(pos, _)| (pos.line, pos.column));
    Err(errors
        .into_iter()
        .map(|(pos, message)| LoadError::Parse { source_name: source_name.to_string(), pos, message })
        .collect())
}

fn end_position(text: &str) -> SourcePos {
    let line = text.lines().count().max(1);
    let column = text.lines().last().map(|l| l.chars().count() + 1).unwrap_or(1);
    SourcePos { line, column }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_comment_fails_the_load() {
        let errors = parse_source("bad.rules", "ENV.defaultStringPatternFlags = 2\n/* nope */\n").unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            LoadError::Parse { source_name, pos, message } => {
                assert_eq!(source_name, "bad.rules");
                assert_eq!(pos.line, 2);
                assert!(message.contains("block comments"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lex_and_parse_errors_are_merged_in_source_order() {
        let errors = parse_source("x", "{ruleType: \"text\", oops: 1}\n$A = /unterminated\n").unwrap_err();
        assert_eq!(errors.len(), 2);
        let lines: Vec<usize> = errors
            .iter()
            .map(|e| match e {
                LoadError::Parse { pos, .. } => pos.line,
                _ => 0,
            })
            .collect();
        assert_eq!(lines, vec![1, 2]);
    }
}
