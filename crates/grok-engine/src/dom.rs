//! HTML tree adapter.
//!
//! The runtime only sees the [`TreeNode`] trait. [`Node`] is the owned tree
//! built from an html5ever parse (via `scraper`), keeping elements and text
//! and dropping comments, doctypes, and processing instructions.

use std::collections::BTreeMap;

use scraper::{ElementRef, Html};

use crate::encoding;
use crate::source::{DefaultFetcher, DocumentError, Fetcher};

/// Read access to a parsed HTML tree.
pub trait TreeNode: Sized {
    /// Lowercased tag name, or `None` for text nodes.
    fn tag(&self) -> Option<&str>;

    /// Attribute value by lowercased name. Always `None` for text nodes.
    fn attr(&self, name: &str) -> Option<&str>;

    /// Children in document order. Empty for text nodes.
    fn children(&self) -> &[Self];

    /// Text payload, or `None` for element nodes.
    fn text(&self) -> Option<&str>;

    fn is_element(&self) -> bool {
        self.tag().is_some()
    }
}

/// A node of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An element with lowercased tag and attribute names.
///
/// Clone, equality, and drop walk the subtree with an explicit worklist, so
/// nesting depth is bounded by memory rather than by the thread stack.
#[derive(Debug)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    fn without_children(&self) -> Element {
        Element {
            tag: self.tag.clone(),
            attributes: self.attributes.clone(),
            children: Vec::with_capacity(self.children.len()),
        }
    }
}

impl Clone for Element {
    fn clone(&self) -> Self {
        let mut current = (self.without_children(), self.children.iter());
        let mut parents = Vec::new();
        loop {
            match current.1.next() {
                Some(Node::Text(text)) => current.0.children.push(Node::Text(text.clone())),
                Some(Node::Element(child)) => {
                    let frame = (child.without_children(), child.children.iter());
                    parents.push(std::mem::replace(&mut current, frame));
                }
                None => match parents.pop() {
                    Some(parent) => {
                        let (done, _) = std::mem::replace(&mut current, parent);
                        current.0.children.push(Node::Element(done));
                    }
                    None => return current.0,
                },
            }
        }
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            if a.tag != b.tag || a.attributes != b.attributes || a.children.len() != b.children.len() {
                return false;
            }
            for pair in a.children.iter().zip(&b.children) {
                match pair {
                    (Node::Text(x), Node::Text(y)) if x == y => {}
                    (Node::Element(x), Node::Element(y)) => pending.push((x, y)),
                    _ => return false,
                }
            }
        }
        true
    }
}

impl Eq for Element {}

impl Drop for Element {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let Node::Element(mut el) = node {
                pending.append(&mut el.children);
            }
        }
    }
}

impl TreeNode for Node {
    fn tag(&self) -> Option<&str> {
        match self {
            Node::Element(el) => Some(&el.tag),
            Node::Text(_) => None,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Node::Element(el) => el.attributes.get(name).map(String::as_str),
            Node::Text(_) => None,
        }
    }

    fn children(&self) -> &[Self] {
        match self {
            Node::Element(el) => &el.children,
            Node::Text(_) => &[],
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Node::Element(_) => None,
            Node::Text(text) => Some(text),
        }
    }
}

/// A parsed HTML document.
///
/// Immutable once built; every capture produced by a search borrows from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Node,
}

impl Document {
    /// Parse a raw byte buffer, honoring a BOM or `<meta>` charset.
    ///
    /// This is the authoritative path: pass the exact bytes a server sent.
    pub fn from_bytes(input: &[u8]) -> Result<Document, DocumentError> {
        Self::parse(&encoding::decode_html(input))
    }

    /// Parse an already-decoded string.
    ///
    /// Charset declarations inside the document are ignored, so results can
    /// differ from [`Document::from_bytes`] for non-ASCII content that was
    /// decoded with the wrong charset upstream.
    pub fn from_string(input: &str) -> Result<Document, DocumentError> {
        Self::parse(input)
    }

    /// Fetch a URI with the [`DefaultFetcher`] and parse the body as bytes.
    pub fn from_uri(uri: &str) -> Result<Document, DocumentError> {
        Self::from_uri_with(uri, &DefaultFetcher::default())
    }

    /// Fetch a URI with the given fetcher and parse the body as bytes.
    pub fn from_uri_with(uri: &str, fetcher: &dyn Fetcher) -> Result<Document, DocumentError> {
        let body = fetcher.fetch(uri)?;
        tracing::debug!(uri, bytes = body.len(), "fetched document");
        Self::from_bytes(&body)
    }

    /// Wrap an existing tree, e.g. one built by hand in tests.
    pub fn from_root(root: Node) -> Document {
        Document { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    fn parse(text: &str) -> Result<Document, DocumentError> {
        if text.trim().is_empty() {
            return Err(DocumentError::new("Document is empty"));
        }

        let html = Html::parse_document(text);
        if !html.errors.is_empty() {
            tracing::trace!(errors = html.errors.len(), "recovered from malformed HTML");
        }

        let root = build_element(html.root_element());
        tracing::debug!(bytes = text.len(), "parsed HTML document");
        Ok(Document {
            root: Node::Element(root),
        })
    }
}

fn build_element(root: ElementRef<'_>) -> Element {
    let mut current = (element_shell(root), root.children());
    let mut parents = Vec::new();
    loop {
        match current.1.next() {
            Some(child) => match child.value() {
                scraper::Node::Text(t) => current.0.children.push(Node::Text(String::from(&**t))),
                scraper::Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        let frame = (element_shell(child), child.children());
                        parents.push(std::mem::replace(&mut current, frame));
                    }
                }
                _ => {}
            },
            None => match parents.pop() {
                Some(parent) => {
                    let (done, _) = std::mem::replace(&mut current, parent);
                    current.0.children.push(Node::Element(done));
                }
                None => return current.0,
            },
        }
    }
}

/// Tag and attributes of a parsed element, with no children yet.
fn element_shell(element: ElementRef<'_>) -> Element {
    let value = element.value();

    let mut attributes = BTreeMap::new();
    for (name, val) in value.attrs() {
        attributes
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| val.to_string());
    }

    Element {
        tag: value.name().to_ascii_lowercase(),
        attributes,
        children: Vec::new(),
    }
}

/// Build an element node. Test and doc helper for hand-made trees.
pub fn element(tag: &str, attributes: &[(&str, &str)], children: Vec<Node>) -> Node {
    Node::Element(Element {
        tag: tag.to_string(),
        attributes: attributes
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        children,
    })
}

/// Build a text node.
pub fn text(content: &str) -> Node {
    Node::Text(content.to_string())
}
