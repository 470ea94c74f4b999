//! Template rendering.
//!
//! `\0` through `\9` expand to the corresponding capture, `\\` is a single
//! backslash, and any other backslash sequence is copied as written.

use crate::runtime::Captures;
use crate::Error;

/// One piece of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece<'a> {
    Literal(&'a str),
    Capture(usize),
}

/// Split a template into literal runs and capture references.
fn pieces(template: &str) -> Vec<Piece<'_>> {
    let bytes = template.as_bytes();
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(d @ b'0'..=b'9') => {
                out.push(Piece::Literal(&template[literal_start..i]));
                out.push(Piece::Capture(usize::from(d - b'0')));
                i += 2;
                literal_start = i;
            }
            Some(b'\\') => {
                // Keep the first backslash, drop the second.
                out.push(Piece::Literal(&template[literal_start..=i]));
                i += 2;
                literal_start = i;
            }
            _ => i += 1,
        }
    }
    out.push(Piece::Literal(&template[literal_start..]));
    out.retain(|p| !matches!(p, Piece::Literal("")));
    out
}

/// Expand `template` with `captures`.
///
/// Every reference is checked before any output is built, so a bad index
/// fails with [`Error::Range`] regardless of where it appears.
pub fn render(captures: &Captures<'_>, template: &str) -> Result<String, Error> {
    let pieces = pieces(template);

    let mut len = 0usize;
    for piece in &pieces {
        len += match *piece {
            Piece::Literal(text) => text.len(),
            Piece::Capture(index) => captures
                .get(index)
                .ok_or(Error::Range {
                    index,
                    available: captures.len(),
                })?
                .len(),
        };
    }

    let mut out = String::new();
    out.try_reserve_exact(len)?;
    for piece in pieces {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            // Bounds were checked above.
            Piece::Capture(index) => out.push_str(captures.get(index).unwrap_or_default()),
        }
    }
    Ok(out)
}
