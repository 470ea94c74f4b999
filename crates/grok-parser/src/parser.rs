//! Tree expression parser.
//!
//! Recursive descent over the token stream from `grok-lexer`. Each error
//! carries the byte offset of the token at which parsing stopped.

use grok_lexer::{Token, TokenKind};
use regex::{Regex, RegexBuilder};

use crate::machine::{AttributeConstraint, AttributeValue, Machine, MatchStep};
use crate::ParseError;

/// Identifier that introduces a text step when followed by `:`.
const TEXT_KEYWORD: &str = "text";

/// Tree expression parser.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Create a new parser for the given tokens. The stream must end in `End`.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Compile expression source into a machine.
    pub fn parse(source: &str) -> Result<Machine, ParseError> {
        let tokens = grok_lexer::Scanner::tokenize(source)?;
        let machine = Parser::new(tokens).parse_machine()?;
        tracing::debug!(expr = source, steps = machine.len(), "compiled tree expression");
        Ok(machine)
    }

    /// `machine := step ( "->" step )* END`
    fn parse_machine(&mut self) -> Result<Machine, ParseError> {
        let mut steps = vec![self.parse_step()?];

        loop {
            match &self.peek().kind {
                TokenKind::Arrow => {
                    if steps.last().is_some_and(MatchStep::is_text) {
                        return Err(self.error("A text step must be the last step"));
                    }
                    self.advance();
                    steps.push(self.parse_step()?);
                }
                TokenKind::End => break,
                other => {
                    return Err(self.error(format!("Expected '->' or end of expression, found {other}")));
                }
            }
        }

        Ok(Machine::from_steps(steps))
    }

    /// `step := element_step | text_step`
    fn parse_step(&mut self) -> Result<MatchStep, ParseError> {
        let tag = match &self.peek().kind {
            TokenKind::Ident(name) => name.clone(),
            other => return Err(self.error(format!("Expected a tag name or 'text', found {other}"))),
        };
        self.advance();

        match self.peek().kind {
            TokenKind::Colon if tag == TEXT_KEYWORD => {
                self.advance();
                self.parse_text_pattern()
            }
            TokenKind::Colon => Err(self.error(format!(
                "Only 'text' steps take a pattern, '{tag}' is an element"
            ))),
            TokenKind::LAngle => {
                self.advance();
                let attributes = self.parse_attr_list()?;
                Ok(MatchStep::Element { tag, attributes })
            }
            _ => Ok(MatchStep::Element {
                tag,
                attributes: Vec::new(),
            }),
        }
    }

    /// Parse the `STRING` of `text:STRING` and compile it.
    fn parse_text_pattern(&mut self) -> Result<MatchStep, ParseError> {
        let offset = self.peek().offset();
        let source = self.expect_string("Expected a quoted pattern after 'text:'")?;
        let pattern = compile_pattern(&source).map_err(|e| ParseError {
            message: format!("Invalid regular expression: {}", regex_error_summary(&e.to_string())),
            offset,
        })?;
        Ok(MatchStep::Text { pattern })
    }

    /// `attr ( [","] attr )* ">"`, called after `<`.
    fn parse_attr_list(&mut self) -> Result<Vec<AttributeConstraint>, ParseError> {
        let mut attributes: Vec<AttributeConstraint> = Vec::new();

        loop {
            let offset = self.peek().offset();
            let name = match &self.peek().kind {
                TokenKind::Ident(name) => name.clone(),
                TokenKind::RAngle if attributes.is_empty() => {
                    return Err(self.error("Attribute list must not be empty"));
                }
                other => return Err(self.error(format!("Expected an attribute name, found {other}"))),
            };
            if attributes.iter().any(|a| a.name == name) {
                return Err(ParseError {
                    message: format!("Duplicate attribute '{name}'"),
                    offset,
                });
            }
            self.advance();

            let value = if self.peek().kind == TokenKind::Eq {
                self.advance();
                AttributeValue::Exact(
                    self.expect_string(&format!("Expected a quoted value for attribute '{name}'"))?,
                )
            } else {
                AttributeValue::Any
            };
            attributes.push(AttributeConstraint { name, value });

            match self.peek().kind {
                TokenKind::RAngle => {
                    self.advance();
                    return Ok(attributes);
                }
                TokenKind::Comma => self.advance(),
                TokenKind::Ident(_) => {}
                ref other => {
                    return Err(self.error(format!("Expected ',' or '>' in attribute list, found {other}")));
                }
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn expect_string(&mut self, message: &str) -> Result<String, ParseError> {
        if let TokenKind::String(value) = &self.peek().kind {
            let value = value.clone();
            self.advance();
            Ok(value)
        } else {
            Err(self.error(message))
        }
    }

    fn peek(&self) -> &Token {
        // The stream always ends in `End` and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            offset: self.peek().offset(),
        }
    }
}

/// Text patterns ignore case, and `.` also matches a newline.
fn compile_pattern(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

/// The last `error:` line of a regex error, or its first line.
fn regex_error_summary(message: &str) -> &str {
    message
        .lines()
        .rev()
        .find(|line| line.starts_with("error:"))
        .map_or(message.lines().next().unwrap_or(message), |line| {
            line.trim_start_matches("error:").trim()
        })
}
