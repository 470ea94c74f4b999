//! grokhtml Lexer
//!
//! Tokenizes tree expressions such as `tr -> td -> text:"foo = (.*)"`
//! into identifiers, quoted strings, and the punctuators `->` `<` `>`
//! `=` `,` `:`. Every token carries its byte span in the source.
//!
//! # Example
//!
//! ```
//! use grok_lexer::{Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("td").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Ident("td".into()));
//! assert_eq!(tokens[1].kind, TokenKind::End);
//! ```

pub mod scanner;
pub mod token;

pub use scanner::Scanner;
pub use token::{Span, Token, TokenKind};

/// Lexer error with the byte offset of the offending input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Lexer error at offset {offset}: {message}")]
pub struct LexerError {
    pub message: String,
    pub offset: usize,
}
