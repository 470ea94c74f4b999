//! grokhtml Engine
//!
//! Runs compiled tree expressions against parsed HTML and renders the
//! captured text through a template.
//!
//! ```text
//! expression ─ Machine::compile ─┐
//! bytes / string / URI ─ Document ┼─ search_document(template) ─ String
//! ```
//!
//! # Example
//!
//! ```
//! use grok_engine::{search_document, Document, Machine};
//!
//! let machine = Machine::compile(r#"tr -> td -> text:"foo = (.*)""#).unwrap();
//! let doc = Document::from_string("<table><tr><td>foo = baz</td></tr></table>").unwrap();
//! assert_eq!(search_document(&doc, r"foo is \1", &machine).unwrap(), "foo is baz");
//! ```

use std::collections::TryReserveError;

pub mod dom;
pub mod encoding;
pub mod registry;
pub mod runtime;
pub mod source;
pub mod template;

pub use dom::{Document, Node, TreeNode};
pub use grok_parser::{Machine, MatchStep, ParseError};
pub use registry::{DocumentHandle, MachineHandle, Registry};
pub use runtime::{search_tree, Captures};
pub use source::{DefaultFetcher, DocumentError, FetchConfig, Fetcher};
pub use template::render;

/// Errors surfaced at operation boundaries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("{0}")]
    Runtime(String),

    #[error("Not enough matches to satisfy pattern: \\{index} requested, {available} captured")]
    Range { index: usize, available: usize },

    #[error("Unable to allocate memory: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Error classification without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Document,
    Runtime,
    Range,
    Allocation,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) => ErrorKind::Parse,
            Error::Document(_) => ErrorKind::Document,
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Range { .. } => ErrorKind::Range,
            Error::Allocation(_) => ErrorKind::Allocation,
        }
    }

    /// Byte offset into the expression, for parse errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Parse(e) => Some(e.offset),
            _ => None,
        }
    }
}

impl Document {
    /// Run a machine over this document. `Ok(None)` means no match.
    pub fn search<'d>(&'d self, machine: &Machine) -> Result<Option<Captures<'d>>, Error> {
        search_tree(machine, self.root())
    }
}

/// Search `document` with `machine` and render the first match through
/// `template`. No match is reported as [`Error::Runtime`].
pub fn search_document(document: &Document, template: &str, machine: &Machine) -> Result<String, Error> {
    let captures = document
        .search(machine)?
        .ok_or_else(|| Error::Runtime("No match found".into()))?;
    tracing::debug!(%machine, captures = captures.len(), "search matched");
    render(&captures, template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = "<h1>Foo!</h1><h2>Bar!</h2><table><tr><td>foo = baz</td></tr></table>";

    fn run(expr: &str, html: &str, template: &str) -> Result<String, Error> {
        let machine = Machine::compile(expr)?;
        let doc = Document::from_bytes(html.as_bytes())?;
        search_document(&doc, template, &machine)
    }

    #[test]
    fn test_s1_foo_is_baz() {
        assert_eq!(run(r#"tr -> td -> text:"foo = (.*)""#, DOC, r"foo is \1").unwrap(), "foo is baz");
    }

    #[test]
    fn test_s2_no_match_is_runtime_error() {
        let err = run(r#"tr -> td -> text:"bar = (.*)""#, DOC, r"bar is \1").unwrap_err();
        assert_eq!(err, Error::Runtime("No match found".into()));
    }

    #[test]
    fn test_s3_parse_error_offset() {
        let err = run(r#"table<border="0" foo=>"#, DOC, r"\0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.offset(), Some(r#"table<border="0" foo="#.len()));
    }

    #[test]
    fn test_s4_attribute_presence() {
        assert_eq!(run(r#"a<href> -> text:".*""#, r#"<a href="x">t</a>"#, r"\0").unwrap(), "t");
        assert!(run(r#"a<href> -> text:".*""#, "<a name=x>t</a>", r"\0").is_err());
    }

    #[test]
    fn test_s5_attribute_order() {
        let html = r#"<img src="x"><img alt="y" src="x"><p><img src="x" alt="y" title="t"></p>"#;
        let doc = Document::from_string(html).unwrap();
        let a = Machine::compile(r#"img<src="x", alt="y">"#).unwrap();
        let b = Machine::compile(r#"img<alt="y", src="x">"#).unwrap();
        assert_eq!(doc.search(&a).unwrap(), doc.search(&b).unwrap());
        assert!(doc.search(&a).unwrap().is_some());
    }

    #[test]
    fn test_s6_range_error() {
        let err = render(&Captures::new(vec!["w", "g1"]), r"\9").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(
            err.to_string(),
            r"Not enough matches to satisfy pattern: \9 requested, 2 captured"
        );
    }

    #[test]
    fn test_text_pattern_ignores_case() {
        let html = "<table><tr><td>FOO = baz</td></tr></table>";
        assert_eq!(run(r#"tr -> td -> text:"foo = (.*)""#, html, r"\1").unwrap(), "baz");
    }

    #[test]
    fn test_text_capture_spans_lines() {
        let html = "<table><tr><td>foo = baz\nqux</td></tr></table>";
        assert_eq!(run(r#"tr -> td -> text:"foo = (.*)""#, html, r"\1").unwrap(), "baz\nqux");
    }

    #[test]
    fn test_deeply_nested_html_is_searchable() {
        let html = "<div>".repeat(20_000) + "<span>deep = 1</span>";
        assert_eq!(run(r#"div -> span -> text:"= (.*)""#, &html, r"\1").unwrap(), "1");
    }

    #[test]
    fn test_declared_charset_reaches_captures() {
        let html = b"<meta charset=\"windows-1252\"><table><tr><td>\x93hi\x94 \x80</td></tr></table>";
        let machine = Machine::compile(r#"td -> text:"(.*)""#).unwrap();
        let doc = Document::from_bytes(html).unwrap();
        assert_eq!(search_document(&doc, r"\1", &machine).unwrap(), "\u{201c}hi\u{201d} \u{20ac}");
    }

    #[test]
    fn test_template_round_trip() {
        let c = Captures::new(vec!["w", "g1"]);
        assert_eq!(render(&c, r"\1").unwrap(), "g1");
        assert_eq!(render(&c, r"\\").unwrap(), r"\");
    }

    #[test]
    fn test_search_is_repeatable() {
        let machine = Machine::compile(r#"td -> text:"(.*)""#).unwrap();
        let doc = Document::from_string(DOC).unwrap();
        let first = search_document(&doc, r"\1", &machine);
        let second = search_document(&doc, r"\1", &machine);
        assert_eq!(first, second);
    }

    #[test]
    fn test_machine_reused_across_documents() {
        let machine = Machine::compile(r#"td -> text:"= (.*)""#).unwrap();
        let one = Document::from_string("<table><tr><td>a = 1</td></tr></table>").unwrap();
        let two = Document::from_string("<table><tr><td>b = 2</td></tr></table>").unwrap();
        assert_eq!(search_document(&one, r"\1", &machine).unwrap(), "1");
        assert_eq!(search_document(&two, r"\1", &machine).unwrap(), "2");
    }

    #[test]
    fn test_shared_across_threads() {
        let machine = Machine::compile(r#"td -> text:"foo = (.*)""#).unwrap();
        let doc = Document::from_string(DOC).unwrap();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| search_document(&doc, r"\1", &machine).unwrap()))
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), "baz");
            }
        });
    }

    #[test]
    fn test_document_error_kind() {
        let err: Error = Document::from_string("").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Document);
        assert_eq!(err.to_string(), "Error opening HTML document: Document is empty");
    }
}
