//! Compiled form of a tree expression.
//!
//! A [`Machine`] is never empty, and if it holds a [`MatchStep::Text`] that
//! step is the last one. Both properties are checked by the parser, which is
//! the only way to build a machine.

use std::fmt;

use regex::Regex;

use crate::parser::Parser;
use crate::ParseError;

/// An attribute constraint on an element step: `name` or `name="value"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeConstraint {
    pub name: String,
    pub value: AttributeValue,
}

/// What an attribute constraint demands of the attribute's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Present with any value.
    Any,
    /// Present and exactly equal.
    Exact(String),
}

impl AttributeConstraint {
    /// Check the constraint against the attribute value found on a node.
    pub fn is_satisfied_by(&self, found: Option<&str>) -> bool {
        match (&self.value, found) {
            (_, None) => false,
            (AttributeValue::Any, Some(_)) => true,
            (AttributeValue::Exact(expected), Some(actual)) => expected == actual,
        }
    }
}

/// One unit of a compiled machine.
#[derive(Debug, Clone)]
pub enum MatchStep {
    /// Match a child element by tag name and attribute constraints.
    Element {
        tag: String,
        attributes: Vec<AttributeConstraint>,
    },
    /// Search a text node with a regular expression.
    Text { pattern: Regex },
}

impl MatchStep {
    pub fn is_text(&self) -> bool {
        matches!(self, MatchStep::Text { .. })
    }
}

impl fmt::Display for MatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStep::Element { tag, attributes } => {
                f.write_str(tag)?;
                if !attributes.is_empty() {
                    f.write_str("<")?;
                    for (i, attr) in attributes.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(&attr.name)?;
                        if let AttributeValue::Exact(value) = &attr.value {
                            write!(f, "=\"{}\"", escape(value))?;
                        }
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            MatchStep::Text { pattern } => write!(f, "text:\"{}\"", escape(pattern.as_str())),
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// A compiled tree expression.
///
/// Immutable after compilation and safe to share across threads.
#[derive(Debug, Clone)]
pub struct Machine {
    steps: Vec<MatchStep>,
}

impl Machine {
    /// Compile an expression. Same as [`Parser::parse`].
    pub fn compile(expr: &str) -> Result<Machine, ParseError> {
        Parser::parse(expr)
    }

    /// Only the parser constructs machines, after checking the step invariants.
    pub(crate) fn from_steps(steps: Vec<MatchStep>) -> Self {
        debug_assert!(!steps.is_empty());
        debug_assert!(steps.iter().rev().skip(1).all(|s| !s.is_text()));
        Self { steps }
    }

    pub fn steps(&self) -> &[MatchStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// A compiled machine holds at least one step, so this is false.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of parenthesized groups the text step can capture, plus the
    /// whole match. Zero when the machine has no text step.
    pub fn capture_slots(&self) -> usize {
        match self.steps.last() {
            Some(MatchStep::Text { pattern }) => pattern.captures_len(),
            _ => 0,
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_any_requires_presence() {
        let c = AttributeConstraint {
            name: "href".into(),
            value: AttributeValue::Any,
        };
        assert!(c.is_satisfied_by(Some("")));
        assert!(c.is_satisfied_by(Some("x")));
        assert!(!c.is_satisfied_by(None));
    }

    #[test]
    fn test_exact_empty_value() {
        let c = AttributeConstraint {
            name: "alt".into(),
            value: AttributeValue::Exact(String::new()),
        };
        assert!(c.is_satisfied_by(Some("")));
        assert!(!c.is_satisfied_by(Some(" ")));
        assert!(!c.is_satisfied_by(None));
    }

    #[test]
    fn test_display_is_canonical_expression() {
        let m = Machine::compile(r#"TABLE<border="0" id> ->tr->td->text:"a \"b\" (.*)""#).unwrap();
        assert_eq!(
            m.to_string(),
            r#"table<border="0", id> -> tr -> td -> text:"a \"b\" (.*)""#
        );
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        for expr in [
            r#"img<alt="", src="x.png">"#,
            r#"a<title="x\\">"#,
            r#"a<title="C:\\dir\\">"#,
            r#"td -> text:"(\d+)\s*\"q\"""#,
        ] {
            let m = Machine::compile(expr).unwrap();
            let again = Machine::compile(&m.to_string()).unwrap();
            assert_eq!(again.to_string(), m.to_string(), "{expr}");
        }
    }

    #[test]
    fn test_display_escapes_backslash() {
        let m = Machine::compile(r#"a<title="x\\">"#).unwrap();
        assert_eq!(m.to_string(), r#"a<title="x\\">"#);
        match &m.steps()[0] {
            MatchStep::Element { attributes, .. } => {
                assert_eq!(attributes[0].value, AttributeValue::Exact(r"x\".into()));
            }
            other => panic!("expected element step, got {other:?}"),
        }
    }

    #[test]
    fn test_display_keeps_regex_escapes() {
        let m = Machine::compile(r#"text:"(\d+)""#).unwrap();
        assert_eq!(m.to_string(), r#"text:"(\\d+)""#);
        assert_eq!(m.capture_slots(), 2);
    }

    #[test]
    fn test_compiled_machine_is_never_empty() {
        let m = Machine::compile("td").unwrap();
        assert!(!m.is_empty());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_capture_slots() {
        assert_eq!(Machine::compile("td").unwrap().capture_slots(), 0);
        assert_eq!(
            Machine::compile(r#"td -> text:"(a)(b)?""#).unwrap().capture_slots(),
            3
        );
    }
}
