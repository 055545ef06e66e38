use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use lazy_regex::regex;
use tracing::debug;

use crate::errors::ParseNzbError;

/// Only this many leading bytes are searched for an XML declaration.
const PROLOG_SCAN_LIMIT: usize = 1024;

/// Converts raw document bytes into text.
///
/// Implementations must be stateless, a single decoder may be used for any
/// number of documents and from any thread.
pub trait Decoder: Send + Sync {
    /// Canonical name of the encoding this decoder handles.
    fn name(&self) -> &str;

    /// Decodes `bytes` into text. Byte sequences that are invalid in the
    /// encoding are replaced rather than reported.
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;
}

/// Constructor stored in a [`CharsetResolver`] table.
pub type DecoderFactory = fn() -> Box<dyn Decoder>;

/// A [`Decoder`] backed by an [`encoding_rs`] encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingDecoder {
    encoding: &'static Encoding,
}

impl EncodingDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

/// UTF-8, the encoding used when a document declares none or one that isn't known.
impl Default for EncodingDecoder {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

impl Decoder for EncodingDecoder {
    fn name(&self) -> &str {
        self.encoding.name()
    }

    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, had_errors) = self.encoding.decode_without_bom_handling(bytes);
        if had_errors {
            debug!(encoding = self.encoding.name(), "replaced malformed byte sequences while decoding");
        }
        text
    }
}

/// Maps encoding labels to decoders.
///
/// Lookup order is: labels registered with [`CharsetResolver::register`],
/// then every label [`encoding_rs`] knows (the WHATWG encoding list), then
/// UTF-8. In strict mode the last step is replaced by
/// [`ParseNzbError::UnsupportedEncoding`].
///
/// ```rust
/// use nzb_charset::CharsetResolver;
///
/// let resolver = CharsetResolver::new();
/// assert_eq!(resolver.resolve(Some("ISO-8859-1")).unwrap().name(), "windows-1252");
/// assert_eq!(resolver.resolve(Some("no-such-charset")).unwrap().name(), "UTF-8");
/// assert!(resolver.clone().strict(true).resolve(Some("no-such-charset")).is_err());
/// ```
#[derive(Clone, Default)]
pub struct CharsetResolver {
    table: HashMap<String, DecoderFactory>,
    strict: bool,
}

impl fmt::Debug for CharsetResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<&str> = self.table.keys().map(String::as_str).collect();
        labels.sort_unstable();
        f.debug_struct("CharsetResolver")
            .field("registered", &labels)
            .field("strict", &self.strict)
            .finish()
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

impl CharsetResolver {
    /// Creates a lenient resolver with no extra table entries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether unknown labels are an error instead of falling back.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Adds (or replaces) a table entry. Labels are matched case-insensitively.
    pub fn register(mut self, label: &str, factory: DecoderFactory) -> Self {
        self.table.insert(normalize_label(label), factory);
        self
    }

    /// Returns a decoder for `declared`, the encoding label from the document prolog.
    ///
    /// A label is only ever read from ASCII-compatible bytes, so labels naming
    /// UTF-16 (or the WHATWG replacement encoding) resolve to UTF-8 instead.
    /// Registered entries are returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`ParseNzbError::UnsupportedEncoding`] if the label is unknown and
    /// the resolver is strict. A missing label is never an error.
    pub fn resolve(&self, declared: Option<&str>) -> Result<Box<dyn Decoder>, ParseNzbError> {
        let Some(label) = declared else {
            return Ok(Box::new(EncodingDecoder::default()));
        };

        if let Some(factory) = self.table.get(&normalize_label(label)) {
            return Ok(factory());
        }

        if let Some(encoding) = Encoding::for_label(label.trim().as_bytes()) {
            let output = encoding.output_encoding();
            if output != encoding {
                debug!(label, using = output.name(), "declared encoding contradicts an ASCII prolog");
            }
            return Ok(Box::new(EncodingDecoder::new(output)));
        }

        if self.strict {
            return Err(ParseNzbError::UnsupportedEncoding {
                label: label.to_string(),
            });
        }

        debug!(
            label,
            fallback = UTF_8.name(),
            "unknown encoding declared, using default"
        );
        Ok(Box::new(EncodingDecoder::default()))
    }

    /// Decodes a complete NZB document.
    ///
    /// A byte order mark takes precedence over the prolog's declaration and is
    /// removed from the output, as is an unmarked UTF-16 prolog. Otherwise the
    /// label found by [`declared_encoding`] is resolved with [`CharsetResolver::resolve`].
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, ParseNzbError> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            return Ok(EncodingDecoder::new(encoding).decode(&bytes[bom_len..]));
        }

        if let Some(encoding) = sniff_utf16(bytes) {
            return Ok(EncodingDecoder::new(encoding).decode(bytes));
        }

        let decoder = self.resolve(declared_encoding(bytes))?;
        Ok(decoder.decode(bytes))
    }
}

/// Detects a UTF-16 document without a byte order mark from its leading `<?`.
fn sniff_utf16(bytes: &[u8]) -> Option<&'static Encoding> {
    match bytes {
        [b'<', 0, b'?', 0, ..] => Some(UTF_16LE),
        [0, b'<', 0, b'?', ..] => Some(UTF_16BE),
        _ => None,
    }
}

/// Extracts the `encoding` pseudo-attribute of a leading `<?xml ... ?>` declaration.
///
/// ```rust
/// use nzb_charset::declared_encoding;
///
/// let xml = br#"<?xml version="1.0" encoding="iso-8859-1" ?><nzb/>"#;
/// assert_eq!(declared_encoding(xml), Some("iso-8859-1"));
/// assert_eq!(declared_encoding(b"<nzb/>"), None);
/// ```
pub fn declared_encoding(bytes: &[u8]) -> Option<&str> {
    let head = &bytes[..bytes.len().min(PROLOG_SCAN_LIMIT)];
    let re = regex!(r#"(?-u)^\s*<\?xml\s[^>]*?\bencoding\s*=\s*(?:"([^"]*)"|'([^']*)')"#B);
    let captures = re.captures(head)?;
    let label = captures.get(1).or_else(|| captures.get(2))?;
    std::str::from_utf8(label.as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct ShoutingAscii;

    impl Decoder for ShoutingAscii {
        fn name(&self) -> &str {
            "x-shouting"
        }

        fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
            Cow::Owned(String::from_utf8_lossy(bytes).to_ascii_uppercase())
        }
    }

    fn shouting() -> Box<dyn Decoder> {
        Box::new(ShoutingAscii)
    }

    #[rstest]
    #[case(r#"<?xml version="1.0" encoding="iso-8859-1" ?>"#, Some("iso-8859-1"))]
    #[case(r#"<?xml version='1.0' encoding='Windows-1251'?>"#, Some("Windows-1251"))]
    #[case("\n\t  <?xml version=\"1.0\" encoding = \"UTF-8\"?>", Some("UTF-8"))]
    #[case(r#"<?xml version="1.0"?>"#, None)]
    #[case(r#"<?xml version="1.0" standalone="yes"?><nzb encoding="utf-8"/>"#, None)]
    #[case(r#"<nzb><meta type="encoding">"koi8-r"</meta></nzb>"#, None)]
    #[case("", None)]
    fn test_declared_encoding(#[case] xml: &str, #[case] expected: Option<&str>) {
        assert_eq!(declared_encoding(xml.as_bytes()), expected);
    }

    #[rstest]
    #[case(None, "UTF-8")]
    #[case(Some("utf-8"), "UTF-8")]
    #[case(Some("  UTF8 "), "UTF-8")]
    #[case(Some("iso-8859-1"), "windows-1252")]
    #[case(Some("ISO-8859-2"), "ISO-8859-2")]
    #[case(Some("shift_jis"), "Shift_JIS")]
    #[case(Some("gb2312"), "GBK")]
    #[case(Some("UTF-16"), "UTF-8")]
    #[case(Some("utf-16be"), "UTF-8")]
    #[case(Some("x-made-up"), "UTF-8")]
    fn test_resolve_lenient(#[case] label: Option<&str>, #[case] expected: &str) {
        let resolver = CharsetResolver::new();
        assert_eq!(resolver.resolve(label).unwrap().name(), expected);
    }

    #[test]
    fn test_resolve_strict() {
        let resolver = CharsetResolver::new().strict(true);
        assert!(resolver.is_strict());
        assert_eq!(resolver.resolve(None).unwrap().name(), "UTF-8");
        assert_eq!(resolver.resolve(Some("koi8-r")).unwrap().name(), "KOI8-R");
        assert_eq!(
            resolver.resolve(Some("x-made-up")).err(),
            Some(ParseNzbError::UnsupportedEncoding {
                label: "x-made-up".to_string()
            })
        );
    }

    #[test]
    fn test_registered_entries_take_precedence() {
        let resolver = CharsetResolver::new()
            .strict(true)
            .register("X-Shouting", shouting)
            .register("utf-8", shouting);

        assert_eq!(resolver.resolve(Some("x-shouting")).unwrap().name(), "x-shouting");
        assert_eq!(resolver.resolve(Some("UTF-8")).unwrap().decode(b"abc"), "ABC");
        // The default for undeclared documents is not affected by the table.
        assert_eq!(resolver.resolve(None).unwrap().name(), "UTF-8");
        assert_eq!(
            format!("{resolver:?}"),
            r#"CharsetResolver { registered: ["utf-8", "x-shouting"], strict: true }"#
        );
    }

    #[test]
    fn test_decode_declared_single_byte_encoding() {
        let mut bytes = br#"<?xml version="1.0" encoding="iso-8859-1"?><nzb><head><meta type="title">caf"#.to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</meta></head></nzb>");

        let text = CharsetResolver::new().decode(&bytes).unwrap();
        assert!(text.contains(r#"<meta type="title">café</meta>"#));
    }

    #[test]
    fn test_decode_bom_overrides_declaration() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("<?xml version=\"1.0\" encoding=\"koi8-r\"?><nzb>ü</nzb>".as_bytes());

        let text = CharsetResolver::new().strict(true).decode(&bytes).unwrap();
        assert_eq!(text, "<?xml version=\"1.0\" encoding=\"koi8-r\"?><nzb>ü</nzb>");
    }

    #[test]
    fn test_decode_utf16_with_and_without_bom() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?><nzb>ü</nzb>";
        let le: Vec<u8> = xml.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let be: Vec<u8> = xml.encode_utf16().flat_map(u16::to_be_bytes).collect();
        let mut le_bom = vec![0xFF, 0xFE];
        le_bom.extend_from_slice(&le);

        let resolver = CharsetResolver::new();
        assert_eq!(resolver.decode(&le).unwrap(), xml);
        assert_eq!(resolver.decode(&be).unwrap(), xml);
        assert_eq!(resolver.decode(&le_bom).unwrap(), xml);
    }

    #[test]
    fn test_decode_ascii_prolog_declaring_utf16() {
        let xml = r#"<?xml version="1.0" encoding="UTF-16"?><nzb>ü</nzb>"#;
        let text = CharsetResolver::new().strict(true).decode(xml.as_bytes()).unwrap();
        assert_eq!(text, xml);
    }

    #[test]
    fn test_decode_unknown_declaration() {
        let bytes = br#"<?xml version="1.0" encoding="x-made-up"?><nzb/>"#;
        assert!(CharsetResolver::new().decode(bytes).is_ok());
        assert_eq!(
            CharsetResolver::new().strict(true).decode(bytes).err(),
            Some(ParseNzbError::UnsupportedEncoding {
                label: "x-made-up".to_string()
            })
        );
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let text = CharsetResolver::new().decode(b"<nzb>\xFF</nzb>").unwrap();
        assert_eq!(text, "<nzb>\u{FFFD}</nzb>");
    }
}
