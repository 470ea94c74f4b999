//! Character set detection for HTML byte buffers.
//!
//! Looks for a byte order mark first, then a `<meta>` charset declaration
//! near the top of the document. Without either, valid UTF-8 stays UTF-8
//! and anything else is read as windows-1252. Labels resolve the WHATWG
//! way, so `iso-8859-1` and `ascii` also mean windows-1252.

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

/// How far into the buffer to look for a `<meta>` charset declaration.
const SNIFF_LIMIT: usize = 1024;

/// Map an encoding label (as found in `charset=`) to an encoding.
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Detect a byte order mark, returning the encoding and BOM length.
pub fn encoding_for_bom(input: &[u8]) -> Option<(&'static Encoding, usize)> {
    Encoding::for_bom(input)
}

/// Find the label of the first `<meta>` charset declaration, covering both
/// `<meta charset="..">` and `<meta http-equiv content="..; charset=..">`.
pub fn sniff_meta_charset(input: &[u8]) -> Option<String> {
    let head = &input[..input.len().min(SNIFF_LIMIT)];
    let lower = head.to_ascii_lowercase();

    let mut from = 0;
    while let Some(start) = find(&lower[from..], b"<meta").map(|i| i + from) {
        let end = lower[start..]
            .iter()
            .position(|&b| b == b'>')
            .map_or(lower.len(), |i| i + start);
        let tag = &lower[start..end];

        if let Some(at) = find(tag, b"charset") {
            let rest = &tag[at + "charset".len()..];
            let rest = trim_ascii_start(rest);
            if let Some(rest) = rest.strip_prefix(b"=") {
                let rest = trim_ascii_start(rest);
                let rest = rest
                    .strip_prefix(b"\"")
                    .or_else(|| rest.strip_prefix(b"'"))
                    .unwrap_or(rest);
                let label: Vec<u8> = rest
                    .iter()
                    .copied()
                    .take_while(|b| b.is_ascii_alphanumeric() || b"-_.:".contains(b))
                    .collect();
                if !label.is_empty() {
                    return Some(String::from_utf8_lossy(&label).into_owned());
                }
            }
        }
        from = end;
    }
    None
}

/// Decode an HTML byte buffer to a string using BOM, meta declaration, or
/// the UTF-8-then-windows-1252 default, in that order. Malformed sequences
/// become U+FFFD.
pub fn decode_html(input: &[u8]) -> String {
    if let Some((encoding, bom)) = encoding_for_bom(input) {
        tracing::trace!(encoding = encoding.name(), "charset from byte order mark");
        return decode(encoding, &input[bom..]);
    }

    if let Some(label) = sniff_meta_charset(input) {
        match encoding_for_label(&label) {
            // A meta tag in ASCII-compatible text cannot truthfully declare UTF-16.
            Some(encoding) if encoding == UTF_16LE || encoding == UTF_16BE => {
                tracing::warn!(%label, "ignoring UTF-16 declaration in 8-bit document");
            }
            Some(encoding) => {
                tracing::trace!(encoding = encoding.name(), %label, "charset from meta declaration");
                return decode(encoding, input);
            }
            None => {
                tracing::warn!(%label, "unsupported charset, using the default");
            }
        }
    }

    match std::str::from_utf8(input) {
        Ok(text) => text.to_owned(),
        Err(_) => {
            tracing::debug!("document is not valid UTF-8, decoding as windows-1252");
            decode(WINDOWS_1252, input)
        }
    }
}

fn decode(encoding: &'static Encoding, input: &[u8]) -> String {
    let (text, malformed) = encoding.decode_without_bom_handling(input);
    if malformed {
        tracing::debug!(encoding = encoding.name(), "replaced malformed byte sequences");
    }
    text.into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    &bytes[skip..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_labels() {
        assert_eq!(encoding_for_label("UTF-8"), Some(UTF_8));
        assert_eq!(encoding_for_label(" windows-1252 "), Some(WINDOWS_1252));
        assert_eq!(encoding_for_label("latin1"), Some(WINDOWS_1252));
        assert_eq!(encoding_for_label("shift_jis"), Some(encoding_rs::SHIFT_JIS));
        assert_eq!(encoding_for_label("klingon"), None);
    }

    #[test]
    fn test_bom() {
        assert_eq!(encoding_for_bom(&[0xEF, 0xBB, 0xBF, b'<']), Some((UTF_8, 3)));
        assert_eq!(encoding_for_bom(&[0xFF, 0xFE, b'<', 0]), Some((UTF_16LE, 2)));
        assert_eq!(encoding_for_bom(b"<html>"), None);
    }

    #[test]
    fn test_meta_charset_attribute() {
        let doc = br#"<html><head><meta charset="ISO-8859-1"></head>"#;
        assert_eq!(sniff_meta_charset(doc).as_deref(), Some("iso-8859-1"));
    }

    #[test]
    fn test_meta_http_equiv() {
        let doc = br#"<meta name="x"><META HTTP-EQUIV="Content-Type" CONTENT="text/html; charset=windows-1252">"#;
        assert_eq!(sniff_meta_charset(doc).as_deref(), Some("windows-1252"));
    }

    #[test]
    fn test_meta_outside_sniff_window() {
        let mut doc = vec![b' '; SNIFF_LIMIT];
        doc.extend_from_slice(br#"<meta charset="latin1">"#);
        assert_eq!(sniff_meta_charset(&doc), None);
    }

    #[test]
    fn test_decode_declared_latin1() {
        let doc = b"<meta charset=latin1><p>caf\xe9</p>";
        assert!(decode_html(doc).ends_with("<p>caf\u{e9}</p>"));
    }

    #[test]
    fn test_decode_declared_windows_1252() {
        let doc = b"<meta charset=\"windows-1252\"><p>\x93hi\x94 \x80</p>";
        assert!(decode_html(doc).ends_with("<p>\u{201c}hi\u{201d} \u{20ac}</p>"));
    }

    #[test]
    fn test_decode_declared_shift_jis() {
        let doc = b"<meta charset=\"shift_jis\"><p>\x93\xfa\x96\x7b</p>";
        assert!(decode_html(doc).ends_with("<p>\u{65e5}\u{672c}</p>"));
    }

    #[test]
    fn test_unknown_label_uses_default() {
        let doc = "<meta charset=\"klingon\"><p>café</p>";
        assert_eq!(decode_html(doc.as_bytes()), doc);
    }

    #[test]
    fn test_decode_undeclared_utf8() {
        let doc = "<p>café</p>".as_bytes();
        assert_eq!(decode_html(doc), "<p>café</p>");
    }

    #[test]
    fn test_decode_undeclared_invalid_utf8_falls_back() {
        assert_eq!(decode_html(b"<p>\xe9 \x80</p>"), "<p>\u{e9} \u{20ac}</p>");
    }

    #[test]
    fn test_decode_utf16_bom() {
        let mut doc = vec![0xFF, 0xFE];
        for unit in "<p>ok</p>".encode_utf16() {
            doc.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_html(&doc), "<p>ok</p>");
    }

    #[test]
    fn test_meta_utf16_declaration_ignored() {
        let doc = "<meta charset=\"utf-16\"><p>café</p>";
        assert_eq!(decode_html(doc.as_bytes()), doc);
    }
}
