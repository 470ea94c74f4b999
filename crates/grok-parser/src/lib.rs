//! grokhtml Parser
//!
//! Compiles a tree expression into a [`Machine`]: a linear chain of
//! element steps optionally closed by a single text step.
//!
//! ```text
//! machine      := step ( "->" step )* END
//! step         := element_step | text_step
//! element_step := IDENT [ "<" attr ( [","] attr )* ">" ]
//! attr         := IDENT [ "=" STRING ]
//! text_step    := "text" ":" STRING
//! ```

pub mod machine;
pub mod parser;

pub use machine::{AttributeConstraint, AttributeValue, Machine, MatchStep};
pub use parser::Parser;

/// Parse error with the byte offset into the expression text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    /// Render the expression with a caret under the offending byte.
    ///
    /// ```
    /// let err = grok_parser::Parser::parse("td<>").unwrap_err();
    /// assert_eq!(err.caret("td<>"), "td<>\n   ^");
    /// ```
    pub fn caret(&self, expr: &str) -> String {
        let pad = expr
            .get(..self.offset)
            .map_or(self.offset, |prefix| prefix.chars().count());
        format!("{expr}\n{}^", " ".repeat(pad))
    }
}

impl From<grok_lexer::LexerError> for ParseError {
    fn from(e: grok_lexer::LexerError) -> Self {
        Self {
            message: e.message,
            offset: e.offset,
        }
    }
}
