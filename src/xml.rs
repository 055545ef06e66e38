use crate::errors::{ParseNzbError, TextPosition};

/// Returns the byte offset at which the document proper begins, skipping
/// leading whitespace, the XML declaration and a DOCTYPE.
///
/// `roxmltree` rejects an XML declaration that isn't at the very start of the
/// input, and NZBs in the wild frequently have whitespace or a byte order
/// mark in front of it.
fn header_len(xml: &str) -> usize {
    let mut s = xml.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}');

    // Strip XML declaration: <?xml ... ?>
    if s.len() >= 5
        && s.is_char_boundary(5)
        && s[..5].eq_ignore_ascii_case("<?xml")
        && let Some(end) = s.find("?>")
    {
        s = s[end + 2..].trim_start();
    }

    // Strip DOCTYPE: <!DOCTYPE ... [ ... ]>
    if s.len() >= 9
        && s.is_char_boundary(9)
        && s[..9].eq_ignore_ascii_case("<!DOCTYPE")
        && let Some(end) = doctype_len(s)
    {
        s = s[end..].trim_start();
    }

    xml.len() - s.len()
}

/// Length of the `<!DOCTYPE ...>` at the start of `s`, including an internal
/// subset. Quoted literals and comments inside it may contain `>` and `]`.
fn doctype_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut in_subset = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += s[i + 1..].find(quote as char)? + 1;
            }
            b'<' if in_subset && s[i..].starts_with("<!--") => {
                i += s[i..].find("-->")? + 2;
            }
            b'[' => in_subset = true,
            b']' => in_subset = false,
            b'>' if !in_subset => return Some(i + 1),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Translates a position inside the stripped document back into the caller's text.
fn original_position(skipped: &str, pos: roxmltree::TextPos) -> TextPosition {
    let skipped_lines = skipped.matches('\n').count() as u32;
    let column = if pos.row == 1 {
        let tail = skipped.rsplit('\n').next().unwrap_or_default();
        pos.col + tail.chars().count() as u32
    } else {
        pos.col
    };
    TextPosition::new(pos.row + skipped_lines, column)
}

/// Thin wrapper around `roxmltree::Document::parse` that strips unsupported
/// XML declarations and DOCTYPEs before parsing.
///
/// Syntax errors are reported against the original `xml`, not the stripped text.
pub(crate) fn parse_document(xml: &str) -> Result<roxmltree::Document<'_>, ParseNzbError> {
    let start = header_len(xml);
    roxmltree::Document::parse(&xml[start..]).map_err(|err| {
        let position = original_position(&xml[..start], err.pos());
        // roxmltree's own position refers to the stripped text.
        let message = err.to_string().replacen(&format!(" at {}", err.pos()), "", 1);
        ParseNzbError::malformed(message, Some(position))
    })
}
