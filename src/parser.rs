use roxmltree::{Document, Node};

use crate::errors::ParseNzbError;
use crate::xml::parse_document;

/// A `<meta type="...">...</meta>` pair, as found in the document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawMeta {
    pub key: String,
    pub value: String,
}

/// A `<segment>` element, with its attributes still in textual form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawSegment {
    pub bytes: Option<String>,
    pub number: Option<String>,
    pub message_id: String,
}

/// A `<file>` element, with its attributes still in textual form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFile {
    pub poster: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub groups: Vec<String>,
    pub segments: Vec<RawSegment>,
}

/// Everything the NZB grammar describes, in document order and nothing else.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawNzb {
    pub meta: Vec<RawMeta>,
    pub files: Vec<RawFile>,
}

fn children<'a, 'input: 'a>(node: Node<'a, 'input>, name: &'a str) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// The source text between `node`'s start and end tags, markup and entity
/// references left as written. Empty for `<e/>` and `<e></e>`.
fn inner_xml(node: Node) -> String {
    let Some(first) = node.first_child() else {
        return String::new();
    };
    let source = node.document().input_text();
    let outer = node.range();
    // An end tag holds no `<` besides its own, so the last `</` starts it.
    let end = source[outer.clone()]
        .rfind("</")
        .map_or(outer.end, |offset| outer.start + offset);
    source
        .get(first.range().start..end)
        .unwrap_or_default()
        .to_string()
}

fn attribute(node: Node, name: &str) -> Option<String> {
    node.attribute(name).map(String::from)
}

/// Parse the `<meta>...</meta>` fields present in an NZB.
///
/// ```xml
/// <nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
///     <head>
///         <meta type="title">Your File!</meta>
///         <meta type="password">secret</meta>
///     </head>
/// </nzb>
/// ```
fn parse_metadata(nzb: Node) -> Vec<RawMeta> {
    children(nzb, "head")
        .flat_map(|head| children(head, "meta"))
        .map(|meta| RawMeta {
            key: meta.attribute("type").unwrap_or_default().to_string(),
            value: inner_xml(meta),
        })
        .collect()
}

/// Parses a single `<file>...</file>` element.
///
/// ```xml
/// <file poster="Joe Bloggs &lt;bloggs@nowhere.example&gt;" date="1071674882" subject="Here's your file!  abc-mr2a.r01 (1/2)">
///     <groups>[...]</groups>
///     <segments>[...]</segments>
/// </file>
/// ```
fn parse_file(node: Node) -> RawFile {
    let groups = children(node, "groups")
        .flat_map(|groups| children(groups, "group"))
        .map(inner_xml)
        .collect();

    let segments = children(node, "segments")
        .flat_map(|segments| children(segments, "segment"))
        .map(|segment| RawSegment {
            bytes: attribute(segment, "bytes"),
            number: attribute(segment, "number"),
            message_id: inner_xml(segment),
        })
        .collect();

    RawFile {
        poster: attribute(node, "poster"),
        date: attribute(node, "date"),
        subject: attribute(node, "subject"),
        groups,
        segments,
    }
}

/// Walks a parsed document, keeping only the elements the NZB grammar names.
///
/// Unknown elements and attributes are skipped, absent ones are left as
/// `None` or empty. The only structural requirement is an `<nzb>` root.
fn parse_tree(doc: &Document) -> Result<RawNzb, ParseNzbError> {
    let root = doc.root_element();
    let name = root.tag_name().name();
    if name != "nzb" {
        return Err(ParseNzbError::malformed(
            format!("expected root element <nzb>, found <{name}>"),
            None,
        ));
    }

    Ok(RawNzb {
        meta: parse_metadata(root),
        files: children(root, "file").map(parse_file).collect(),
    })
}

/// Parses decoded NZB text into a [`RawNzb`].
///
/// # Errors
///
/// Returns [`ParseNzbError::MalformedDocument`] if `text` isn't well-formed XML
/// or its root element isn't `<nzb>`.
pub fn parse_raw(text: &str) -> Result<RawNzb, ParseNzbError> {
    let doc = parse_document(text)?;
    parse_tree(&doc)
}
