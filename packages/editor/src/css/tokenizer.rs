use logos::Logos;
use std::fmt;

/// Token types for stylesheet text
///
/// The parser only needs block structure, so everything that is not a
/// brace, a semicolon, a quoted string or a comment is one `Chunk`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
pub enum Token<'src> {
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semicolon,

    // Quoted strings may contain braces and semicolons
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice())]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| lex.slice())]
    String(&'src str),

    #[regex(r#"[^{};"'/]+"#, |lex| lex.slice())]
    Chunk(&'src str),

    // A slash that does not open a comment, e.g. `grid-area: 1 / 2`
    #[token("/")]
    Slash,
}

impl<'src> Token<'src> {
    /// Source text the token stands for
    pub fn text(&self) -> &'src str {
        match self {
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Semicolon => ";",
            Token::String(s) | Token::Chunk(s) => s,
            Token::Slash => "/",
        }
    }
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
            Token::String(s) => write!(f, "string {}", s),
            Token::Chunk(s) => write!(f, "text '{}'", s.trim()),
            Token::Slash => write!(f, "/"),
        }
    }
}

/// Tokenize stylesheet text, keeping lexer errors with their spans
pub fn tokenize(source: &str) -> Vec<(Result<Token<'_>, ()>, std::ops::Range<usize>)> {
    Token::lexer(source).spanned().collect()
}
