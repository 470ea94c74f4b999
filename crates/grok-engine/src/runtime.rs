//! Machine runtime.
//!
//! The first step of a machine may anchor at any node of the tree; every
//! later step must match a direct child of the node matched by the step
//! before it. Candidate anchors are tried in document pre-order and the
//! first complete match wins.

use grok_parser::{Machine, MatchStep};

use crate::dom::TreeNode;
use crate::Error;

/// Substrings captured by a text step. Index 0 is the whole match, the rest
/// are parenthesized groups in source order. Groups that did not take part
/// in the match are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures<'t> {
    groups: Vec<&'t str>,
}

impl<'t> Captures<'t> {
    pub fn new(groups: Vec<&'t str>) -> Self {
        Self { groups }
    }

    pub fn get(&self, index: usize) -> Option<&'t str> {
        self.groups.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn as_slice(&self) -> &[&'t str] {
        &self.groups
    }
}

/// Run `machine` over the tree rooted at `root`.
///
/// Returns `Ok(None)` when nothing matches.
pub fn search_tree<'t, N: TreeNode>(machine: &Machine, root: &'t N) -> Result<Option<Captures<'t>>, Error> {
    let steps = machine.steps();

    // Explicit pre-order stack: children are pushed in reverse so the
    // first child is visited next.
    let mut stack = vec![root];
    let mut visited = 0usize;
    while let Some(node) = stack.pop() {
        visited += 1;
        if let Some(captures) = match_at(steps, node)? {
            tracing::trace!(visited, captures = captures.len(), "machine matched");
            return Ok(Some(captures));
        }
        stack.extend(node.children().iter().rev());
    }

    tracing::trace!(visited, "machine did not match");
    Ok(None)
}

/// Try to satisfy `steps` with `steps[0]` matched at `node` itself.
fn match_at<'t, N: TreeNode>(steps: &[MatchStep], node: &'t N) -> Result<Option<Captures<'t>>, Error> {
    let Some((step, rest)) = steps.split_first() else {
        return Ok(Some(Captures::default()));
    };

    match step {
        MatchStep::Element { tag, attributes } => {
            if node.tag() != Some(tag.as_str()) {
                return Ok(None);
            }
            if !attributes.iter().all(|c| c.is_satisfied_by(node.attr(&c.name))) {
                return Ok(None);
            }
            if rest.is_empty() {
                return Ok(Some(Captures::default()));
            }
            for child in node.children() {
                if let Some(captures) = match_at(rest, child)? {
                    return Ok(Some(captures));
                }
            }
            Ok(None)
        }
        MatchStep::Text { pattern } => {
            let Some(content) = node.text() else {
                return Ok(None);
            };
            let Some(found) = pattern.captures(content) else {
                return Ok(None);
            };

            let mut groups = Vec::new();
            groups.try_reserve_exact(found.len())?;
            groups.extend(found.iter().map(|m| m.map_or("", |m| m.as_str())));
            Ok(Some(Captures::new(groups)))
        }
    }
}
