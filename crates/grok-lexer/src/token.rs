use std::fmt;

/// A byte range in expression source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Token classification for tree expressions.
///
/// Data-carrying variants embed their value directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Tag or attribute name, already lowercased.
    Ident(String),
    /// Quoted string with `\"` `\\` `\n` `\t` expanded.
    String(String),

    Arrow,  // ->
    LAngle, // <
    RAngle, // >
    Eq,     // =
    Comma,  // ,
    Colon,  // :

    End,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::String(_) => f.write_str("string"),
            TokenKind::Arrow => f.write_str("'->'"),
            TokenKind::LAngle => f.write_str("'<'"),
            TokenKind::RAngle => f.write_str("'>'"),
            TokenKind::Eq => f.write_str("'='"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::End => f.write_str("end of expression"),
        }
    }
}

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Byte offset where this token starts.
    pub fn offset(&self) -> usize {
        self.span.start
    }
}
