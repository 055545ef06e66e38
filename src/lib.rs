/*!
nzb-charset
===========

`nzb-charset` parses [NZB](https://en.wikipedia.org/wiki/NZB) files into plain Rust data,
whatever text encoding the file was written in.

The pipeline is:

1. [`CharsetResolver`] turns the raw bytes into text, using a byte order mark or the
   `encoding` declared in the `<?xml ... ?>` prolog. Unknown or missing encodings fall back
   to UTF-8 unless strict mode is requested.
2. [`parse_raw`] walks the XML and keeps only what the NZB grammar names, ignoring unknown
   elements and attributes.
3. [`build`] reshapes that into an [`Nzb`]: a metadata map and the files in document order.

Nothing is sorted for you. [`Nzb::sort_files`] orders files by [`File::sequence_part`], which
no NZB attribute provides; it is `0` after parsing and it's up to the caller to set it,
for example with [`Nzb::assign_sequence_parts`].

Optional features:

- `serde`: Enables serialization and deserialization via [serde](https://crates.io/crates/serde).

## Example

```rust
use nzb_charset::{Nzb, ParseNzbError};

fn main() -> Result<(), ParseNzbError> {
    let xml = br#"<?xml version="1.0" encoding="iso-8859-1"?>
        <nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
            <head>
                <meta type="title">Big Buck Bunny</meta>
            </head>
            <file poster="John &lt;nzb@nowhere.example&gt;" date="1706440708" subject="[1/1] - &quot;Big Buck Bunny - S01E01.mkv&quot; yEnc (1/2) 1478616">
                <groups>
                    <group>alt.binaries.boneless</group>
                </groups>
                <segments>
                    <segment bytes="739067" number="1">9cacde4c986547369becbf97003fb2c5-9483514693959@example</segment>
                    <segment bytes="739549" number="2">70a3a038ce324e618e2751e063d6a036-7285710986748@example</segment>
                </segments>
            </file>
        </nzb>
        "#;
    let nzb = Nzb::parse_from_bytes(xml)?;
    assert_eq!(nzb.meta_value("title"), Some("Big Buck Bunny"));
    assert_eq!(nzb.files[0].name(), Some("Big Buck Bunny - S01E01.mkv"));
    assert_eq!(nzb.size(), 1_478_616);
    Ok(())
}
```
*/

mod builder;
mod charset;
mod errors;
mod parser;
mod subparsers;
mod xml;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use itertools::Itertools;
use lazy_regex::regex;
use tracing::trace;

pub use crate::builder::build;
pub use crate::charset::{CharsetResolver, Decoder, DecoderFactory, EncodingDecoder, declared_encoding};
pub use crate::errors::{ParseNzbError, ParseNzbFileError, TextPosition};
pub use crate::parser::{RawFile, RawMeta, RawNzb, RawSegment, parse_raw};
use crate::subparsers::{extract_filename_from_subject, file_part_from_subject, split_filename_at_extension};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents a single segment of a file in an NZB.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    /// Size of the segment in bytes.
    pub size: u64,
    /// 1-based position of the segment within its file.
    pub number: u32,
    /// Message ID of the article holding the segment.
    pub message_id: String,
}

impl Segment {
    /// Creates a new `Segment` instance.
    pub fn new(size: impl Into<u64>, number: impl Into<u32>, message_id: impl Into<String>) -> Self {
        Self {
            size: size.into(),
            number: number.into(),
            message_id: message_id.into(),
        }
    }
}

/// Represents a complete file, consisting of segments that make up a file.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct File {
    /// The poster of the file.
    pub poster: String,
    /// When the file was posted, in seconds since the Unix epoch.
    pub date: i64,
    /// The subject of the file.
    pub subject: String,
    /// Groups that reference the file, as declared.
    pub groups: Vec<String>,
    /// Segments that make up the file, as declared.
    pub segments: Vec<Segment>,
    /// Position of the file within its release, used by [`Nzb::sort_files`].
    ///
    /// No part of the NZB format supplies this value, so parsing always leaves it at `0`.
    /// Whether it should be derived from the subject is left to the caller; see
    /// [`File::part_from_subject`].
    pub sequence_part: u32,
}

impl File {
    /// Creates a new `File` instance with a `sequence_part` of `0`.
    pub fn new(
        poster: impl Into<String>,
        date: i64,
        subject: impl Into<String>,
        groups: impl IntoIterator<Item = impl Into<String>>,
        segments: impl IntoIterator<Item = Segment>,
    ) -> Self {
        Self {
            poster: poster.into(),
            date,
            subject: subject.into(),
            groups: groups.into_iter().map(Into::into).collect(),
            segments: segments.into_iter().collect(),
            sequence_part: 0,
        }
    }

    /// Size of the file calculated from the sum of segment sizes.
    pub fn size(&self) -> u64 {
        self.segments.iter().map(|s| s.size).sum()
    }

    /// [`File::date`] as a UTC timestamp, or [`None`] if it is out of range.
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }

    /// Complete name of the file with it's extension extracted from the subject.
    /// May return [`None`] if it fails to extract the name.
    pub fn name(&self) -> Option<&str> {
        extract_filename_from_subject(&self.subject)
    }

    /// Base name of the file without it's extension extracted from the [`File::name`].
    pub fn stem(&self) -> Option<&str> {
        self.name().map(|name| split_filename_at_extension(name).0)
    }

    /// Extension of the file extracted from the [`File::name`].
    pub fn extension(&self) -> Option<&str> {
        self.name().and_then(|name| split_filename_at_extension(name).1)
    }

    /// Return [`true`] if the file is a `.par2` file, [`false`] otherwise.
    pub fn is_par2(&self) -> bool {
        let re = regex!(r"\.par2$"i);
        self.name().is_some_and(|name| re.is_match(name))
    }

    /// Return [`true`] if the file is a `.rar` file, [`false`] otherwise.
    pub fn is_rar(&self) -> bool {
        let re = regex!(r"(\.rar|\.r\d\d|\.s\d\d|\.t\d\d|\.u\d\d|\.v\d\d)$"i);
        self.name().is_some_and(|name| re.is_match(name))
    }

    /// The file counter at the start of the subject, e.g. `3` for `[3/12] - "x.rar" yEnc (1/50)`.
    ///
    /// This is one possible source for [`File::sequence_part`]; it is never applied implicitly.
    pub fn part_from_subject(&self) -> Option<u32> {
        file_part_from_subject(&self.subject)
    }

    /// Compares two files by [`File::sequence_part`], ascending.
    pub fn cmp_by_sequence_part(&self, other: &File) -> Ordering {
        self.sequence_part.cmp(&other.sequence_part)
    }
}

/// Settings for [`Nzb::parse_from_bytes_with`].
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    resolver: CharsetResolver,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`ParseNzbError::UnsupportedEncoding`] instead of falling back to UTF-8
    /// when the declared encoding is unknown.
    pub fn strict_encoding(mut self, strict: bool) -> Self {
        self.resolver = self.resolver.strict(strict);
        self
    }

    /// Replaces the charset table used to decode documents.
    pub fn resolver(mut self, resolver: CharsetResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn charset_resolver(&self) -> &CharsetResolver {
        &self.resolver
    }
}

/// Represents an NZB.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Nzb {
    /// `<meta type="key">value</meta>` pairs from the head. A repeated key keeps its last value.
    pub meta: BTreeMap<String, String>,
    /// The files in the NZB, in document order until [`Nzb::sort_files`] is called.
    pub files: Vec<File>,
}

impl FromStr for Nzb {
    type Err = ParseNzbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nzb = build(parse_raw(s)?);
        trace!(files = nzb.files.len(), meta = nzb.meta.len(), "parsed nzb");
        Ok(nzb)
    }
}

impl Nzb {
    /// Parses an already decoded NZB document.
    ///
    /// Any `encoding` in the prolog is ignored since the text is decoded already.
    ///
    /// # Errors
    ///
    /// Returns [`ParseNzbError::MalformedDocument`] if the text is not well-formed XML
    /// or the root element is not `<nzb>`.
    pub fn parse_from_text(text: &str) -> Result<Self, ParseNzbError> {
        Self::from_str(text)
    }

    /// Same as [`Nzb::parse_from_text`].
    pub fn parse(xml: impl AsRef<str>) -> Result<Self, ParseNzbError> {
        Self::from_str(xml.as_ref())
    }

    /// Decodes and parses an NZB document, falling back to UTF-8 for unknown encodings.
    ///
    /// # Errors
    ///
    /// Returns [`ParseNzbError::MalformedDocument`] if the decoded text is not well-formed
    /// XML or the root element is not `<nzb>`.
    pub fn parse_from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self, ParseNzbError> {
        Self::parse_from_bytes_with(bytes, &ParseOptions::default())
    }

    /// Decodes and parses an NZB document with the given options.
    ///
    /// # Errors
    ///
    /// Like [`Nzb::parse_from_bytes`], and [`ParseNzbError::UnsupportedEncoding`] if the
    /// options request strict encoding resolution and the declared encoding is unknown.
    pub fn parse_from_bytes_with(bytes: impl AsRef<[u8]>, options: &ParseOptions) -> Result<Self, ParseNzbError> {
        let text = options.resolver.decode(bytes.as_ref())?;
        Self::from_str(&text)
    }

    /// Reads `reader` to the end and parses the bytes with [`Nzb::parse_from_bytes`].
    ///
    /// # Errors
    ///
    /// Read failures are returned unchanged as [`ParseNzbFileError::Read`].
    pub fn from_reader(mut reader: impl Read) -> Result<Self, ParseNzbFileError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|source| ParseNzbFileError::Read { source })?;
        Ok(Self::parse_from_bytes(bytes)?)
    }

    /// Parses an NZB file from disk, transparently decompressing it if its extension is `.gz`.
    ///
    /// # Errors
    ///
    /// - [`ParseNzbFileError::Io`] if the file can't be read.
    /// - [`ParseNzbFileError::Gzip`] if a `.gz` file fails to decompress.
    /// - [`ParseNzbFileError::Parse`] if the contents are not a valid NZB.
    pub fn parse_file(nzb: impl AsRef<Path>) -> Result<Self, ParseNzbFileError> {
        let given = nzb.as_ref();
        let file = dunce::canonicalize(given).unwrap_or_else(|_| given.to_path_buf());

        let raw = std::fs::read(&file).map_err(|e| ParseNzbFileError::from_io_err(e, &file))?;

        let is_gzip = file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));

        let bytes = if is_gzip {
            let mut decompressed = Vec::new();
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut decompressed)
                .map_err(|e| ParseNzbFileError::from_gzip_err(e, &file))?;
            decompressed
        } else {
            raw
        };

        Ok(Self::parse_from_bytes(bytes)?)
    }

    /// Value of the `<meta>` entry with the given type.
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Stable sort of [`Nzb::files`] by [`File::sequence_part`].
    ///
    /// Files with equal parts keep their relative order, so sorting a freshly parsed
    /// NZB (where every part is `0`) leaves it unchanged.
    pub fn sort_files(&mut self) {
        self.files.sort_by(File::cmp_by_sequence_part);
    }

    /// Sets [`File::sequence_part`] from [`File::part_from_subject`] wherever the subject
    /// has a leading file counter. Other files are left untouched.
    pub fn assign_sequence_parts(&mut self) {
        for file in &mut self.files {
            if let Some(part) = file.part_from_subject() {
                file.sequence_part = part;
            }
        }
    }

    /// The largest file in the NZB, usually the main content.
    pub fn file(&self) -> Option<&File> {
        self.files.iter().max_by_key(|file| file.size())
    }

    /// Total size of all the files in the NZB.
    pub fn size(&self) -> u64 {
        self.files.iter().map(File::size).sum()
    }

    /// Vector of unique file names across all the files in the NZB.
    pub fn filenames(&self) -> Vec<&str> {
        self.files.iter().filter_map(File::name).unique().sorted().collect()
    }

    /// Vector of unique posters across all the files in the NZB.
    pub fn posters(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.poster.as_str()).unique().sorted().collect()
    }

    /// Vector of unique groups across all the files in the NZB.
    pub fn groups(&self) -> Vec<&str> {
        self.files
            .iter()
            .flat_map(|f| f.groups.iter().map(String::as_str))
            .unique()
            .sorted()
            .collect()
    }

    /// The `.par2` files in the NZB.
    pub fn par2_files(&self) -> Vec<&File> {
        self.files.iter().filter(|f| f.is_par2()).collect()
    }

    /// Return [`true`] if there's at least one `.par2` file in the NZB, [`false`] otherwise.
    pub fn has_par2(&self) -> bool {
        self.files.iter().any(File::is_par2)
    }
}
