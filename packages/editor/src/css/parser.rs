//! Stylesheet text parser
//!
//! Builds the [`StyleSheet`] object model from tokens. Only block structure
//! is interpreted; selectors and values are kept as trimmed text.

use super::stylesheet::{Declaration, Declarations, RuleSet, StyleRule, StyleSheet};
use super::tokenizer::{tokenize, Token};
use std::ops::Range;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CssParseError {
    #[error("Unrecognized input at {span:?}")]
    Lex { span: Range<usize> },

    #[error("Unexpected {found} at {span:?}")]
    UnexpectedToken { span: Range<usize>, found: String },

    #[error("Unexpected end of input: expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("Invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
}

/// At-rules whose blocks contain rules rather than declarations
const GROUP_AT_RULES: &[&str] = &[
    "@media",
    "@supports",
    "@container",
    "@layer",
    "@document",
    "@keyframes",
    "@-webkit-keyframes",
];

/// Parse stylesheet text
pub fn parse_stylesheet(source: &str) -> Result<StyleSheet, CssParseError> {
    let mut tokens = Vec::new();
    for (result, span) in tokenize(source) {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(CssParseError::Lex { span }),
        }
    }

    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_sheet()
}

struct Parser<'src> {
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
}

/// What ended a run of text
enum Terminator {
    LBrace,
    RBrace,
    Semicolon,
    Eof,
}

impl<'src> Parser<'src> {
    /// Collect text tokens up to the next structural token (consumed)
    fn text_until_structure(&mut self) -> (String, Terminator, Range<usize>) {
        let mut text = String::new();
        while let Some((token, span)) = self.tokens.get(self.pos) {
            self.pos += 1;
            match token {
                Token::LBrace => return (text, Terminator::LBrace, span.clone()),
                Token::RBrace => return (text, Terminator::RBrace, span.clone()),
                Token::Semicolon => return (text, Terminator::Semicolon, span.clone()),
                other => text.push_str(other.text()),
            }
        }
        let end = self.tokens.last().map(|(_, s)| s.end).unwrap_or(0);
        (text, Terminator::Eof, end..end)
    }

    fn parse_sheet(&mut self) -> Result<StyleSheet, CssParseError> {
        let mut sheet = StyleSheet::new();

        loop {
            let (text, terminator, span) = self.text_until_structure();
            let prelude = collapse(&text);
            match terminator {
                Terminator::Eof => {
                    if !prelude.is_empty() {
                        return Err(CssParseError::UnexpectedEof {
                            expected: "'{'".to_string(),
                        });
                    }
                    return Ok(sheet);
                }
                Terminator::Semicolon => {
                    if prelude.starts_with('@') {
                        sheet.statements.push(format!("{};", prelude));
                    } else if !prelude.is_empty() {
                        return Err(CssParseError::UnexpectedToken {
                            span,
                            found: "';'".to_string(),
                        });
                    }
                }
                Terminator::RBrace => {
                    return Err(CssParseError::UnexpectedToken {
                        span,
                        found: "'}'".to_string(),
                    });
                }
                Terminator::LBrace => {
                    if is_group(&prelude) {
                        let rules = self.parse_group_body()?;
                        sheet.rule_sets.push(RuleSet {
                            condition: Some(prelude),
                            rules,
                        });
                    } else {
                        let declarations = self.parse_declarations()?;
                        push_base_rule(
                            &mut sheet,
                            StyleRule {
                                selector: prelude,
                                declarations,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Rules inside a group block, up to and including its closing brace
    fn parse_group_body(&mut self) -> Result<Vec<StyleRule>, CssParseError> {
        let mut rules = Vec::new();
        loop {
            let (text, terminator, _) = self.text_until_structure();
            let prelude = collapse(&text);
            match terminator {
                Terminator::RBrace => {
                    if !prelude.is_empty() {
                        warn!(text = %prelude, "Dropping stray text in group block");
                    }
                    return Ok(rules);
                }
                Terminator::LBrace => {
                    let declarations = self.parse_declarations()?;
                    rules.push(StyleRule {
                        selector: prelude,
                        declarations,
                    });
                }
                Terminator::Semicolon => {
                    if !prelude.is_empty() {
                        warn!(text = %prelude, "Dropping statement inside group block");
                    }
                }
                Terminator::Eof => {
                    return Err(CssParseError::UnexpectedEof {
                        expected: "'}'".to_string(),
                    })
                }
            }
        }
    }

    /// Declarations up to and including the closing brace
    fn parse_declarations(&mut self) -> Result<Declarations, CssParseError> {
        let mut declarations = Declarations::new();
        loop {
            let (text, terminator, span) = self.text_until_structure();
            push_declaration(&mut declarations, &text);
            match terminator {
                Terminator::Semicolon => continue,
                Terminator::RBrace => return Ok(declarations),
                Terminator::LBrace => {
                    return Err(CssParseError::UnexpectedToken {
                        span,
                        found: "nested block".to_string(),
                    })
                }
                Terminator::Eof => {
                    return Err(CssParseError::UnexpectedEof {
                        expected: "'}'".to_string(),
                    })
                }
            }
        }
    }
}

fn push_declaration(declarations: &mut Declarations, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match text.split_once(':') {
        Some((property, value)) if !property.trim().is_empty() => {
            declarations.push(Declaration::new(
                property.trim().to_ascii_lowercase(),
                collapse(value),
            ));
        }
        _ => warn!(text = %text, "Skipping malformed declaration"),
    }
}

fn is_group(prelude: &str) -> bool {
    let keyword = prelude.split_whitespace().next().unwrap_or("");
    GROUP_AT_RULES
        .iter()
        .any(|group| keyword.eq_ignore_ascii_case(group))
}

/// Extend a trailing base segment, or open a new one after the last group
fn push_base_rule(sheet: &mut StyleSheet, rule: StyleRule) {
    match sheet.rule_sets.last_mut() {
        Some(set) if set.condition.is_none() => set.rules.push(rule),
        _ => sheet.rule_sets.push(RuleSet {
            condition: None,
            rules: vec![rule],
        }),
    }
}

/// Trim and squeeze internal whitespace runs to one space
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
