mod common;

use std::borrow::Cow;

use common::{get_file, get_nzb_bytes};
use nzb_charset::{CharsetResolver, Decoder, Nzb, ParseOptions};
use pretty_assertions::assert_eq;
use rstest::rstest;

const BODY: &str = r#"<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
    <head><meta type="title">Plain ASCII title</meta></head>
    <file poster="poster@example" date="1590927494" subject="[1/1] - &quot;plain.bin&quot; yEnc (1/1) 581">
        <groups><group>alt.binaries.test</group></groups>
        <segments><segment bytes="581" number="1">plain-1@example</segment></segments>
    </file>
</nzb>"#;

#[rstest]
#[case::explicit_utf8(r#"<?xml version="1.0" encoding="UTF-8"?>"#)]
#[case::lowercase_utf8(r#"<?xml version="1.0" encoding="utf-8"?>"#)]
#[case::no_encoding(r#"<?xml version="1.0"?>"#)]
#[case::unknown_encoding(r#"<?xml version="1.0" encoding="x-unknown"?>"#)]
#[case::latin1(r#"<?xml version="1.0" encoding="ISO-8859-1"?>"#)]
fn test_ascii_documents_decode_identically(#[case] prolog: &str) {
    let undeclared = Nzb::parse_from_bytes(BODY).unwrap();
    let declared = Nzb::parse_from_bytes(format!("{prolog}\n{BODY}")).unwrap();
    assert_eq!(declared, undeclared);
    assert_eq!(declared.meta_value("title"), Some("Plain ASCII title"));
}

#[test]
fn test_latin1_file() {
    let nzb = Nzb::parse_file(get_file("latin1.nzb")).unwrap();
    assert_eq!(nzb.meta_value("title"), Some("Café Crème à la française"));

    let file = &nzb.files[0];
    assert_eq!(file.poster, "Renée <renee@nowhere.example>");
    assert_eq!(file.groups, vec!["alt.binaries.français"]);
    assert_eq!(file.name(), Some("Café.mkv"));
    assert_eq!(file.segments[0].message_id, "café-1@example");
}

#[test]
fn test_latin1_bytes_read_as_utf8_are_replaced_not_rejected() {
    let bytes = get_nzb_bytes("latin1.nzb");
    let text = String::from_utf8_lossy(&bytes);
    let nzb = Nzb::parse_from_text(&text).unwrap();
    assert_eq!(nzb.meta_value("title"), Some("Caf\u{FFFD} Cr\u{FFFD}me \u{FFFD} la fran\u{FFFD}aise"));
}

#[test]
fn test_utf16_document() {
    let xml = format!("<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n{}", BODY.replace("Plain ASCII", "Ünïcödé"));
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(xml.encode_utf16().flat_map(u16::to_le_bytes));

    let nzb = Nzb::parse_from_bytes(&bytes).unwrap();
    assert_eq!(nzb.meta_value("title"), Some("Ünïcödé title"));
    assert_eq!(nzb.files.len(), 1);
}

#[test]
fn test_utf16_label_on_single_byte_document() {
    let nzb =
        Nzb::parse_from_bytes(br#"<?xml version="1.0" encoding="UTF-16"?><nzb><head><meta type="t">x</meta></head></nzb>"#)
            .unwrap();
    assert_eq!(nzb.meta_value("t"), Some("x"));

    let mislabeled = format!("<?xml version=\"1.0\" encoding=\"utf-16le\"?>\n{BODY}");
    let nzb = Nzb::parse_from_bytes(mislabeled).unwrap();
    assert_eq!(nzb, Nzb::parse_from_bytes(BODY).unwrap());
}

#[test]
fn test_cyrillic_single_byte_encoding() {
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"windows-1251\"?>\n{}",
        BODY.replace("Plain ASCII", "Заголовок")
    );
    let (encoded, _, had_errors) = encoding_rs::WINDOWS_1251.encode(&xml);
    assert!(!had_errors);

    let nzb = Nzb::parse_from_bytes(&encoded).unwrap();
    assert_eq!(nzb.meta_value("title"), Some("Заголовок title"));
}

struct Rot13;

impl Decoder for Rot13 {
    fn name(&self) -> &str {
        "x-rot13"
    }

    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let text = String::from_utf8_lossy(bytes);
        // Only rotate element content, so the markup stays intact.
        let mut out = String::with_capacity(text.len());
        let mut in_tag = false;
        for c in text.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                _ => {}
            }
            out.push(match c {
                'a'..='z' if !in_tag => (((c as u8 - b'a') + 13) % 26 + b'a') as char,
                'A'..='Z' if !in_tag => (((c as u8 - b'A') + 13) % 26 + b'A') as char,
                _ => c,
            });
        }
        Cow::Owned(out)
    }
}

fn rot13() -> Box<dyn Decoder> {
    Box::new(Rot13)
}

#[test]
fn test_custom_decoder_table() {
    let xml = r#"<?xml version="1.0" encoding="X-ROT13"?><nzb><head><meta type="title">Uryyb</meta></head></nzb>"#;

    let options = ParseOptions::new().resolver(CharsetResolver::new().register("x-rot13", rot13));
    let nzb = Nzb::parse_from_bytes_with(xml, &options).unwrap();
    assert_eq!(nzb.meta_value("title"), Some("Hello"));

    // Without the table entry the label is unknown and the bytes are read as UTF-8.
    let nzb = Nzb::parse_from_bytes(xml).unwrap();
    assert_eq!(nzb.meta_value("title"), Some("Uryyb"));
}

#[test]
fn test_resolver_is_shareable_across_threads() {
    let options = ParseOptions::new().resolver(CharsetResolver::new().register("x-rot13", rot13));
    let bytes = get_nzb_bytes("latin1.nzb");

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| Nzb::parse_from_bytes_with(&bytes, &options).unwrap()))
            .collect();
        for handle in handles {
            let nzb = handle.join().unwrap();
            assert_eq!(nzb.meta_value("title"), Some("Café Crème à la française"));
        }
    });
}
