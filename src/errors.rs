use std::fmt;
use std::{io, path::PathBuf};
use thiserror::Error;

/// A 1-based line/column location inside the text handed to the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
}

impl TextPosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Represents errors that can occur during the parsing of an NZB document.
pub enum ParseNzbError {
    /// The prolog declares a text encoding that no decoder is registered for.
    /// Only raised when strict encoding resolution was requested; otherwise
    /// the document is decoded with the default encoding instead.
    #[error("Unsupported text encoding '{label}' declared in the XML prolog.")]
    UnsupportedEncoding {
        /// The encoding label exactly as it appeared in the prolog.
        label: String,
    },

    /// The input is not well-formed XML, or its root element is not `<nzb>`.
    #[error("{}", malformed_message(.message, .position))]
    MalformedDocument {
        /// Description of the problem, usually from
        /// [`roxmltree`](https://crates.io/crates/roxmltree).
        message: String,
        /// Where the problem was found, if the tokenizer reported it.
        position: Option<TextPosition>,
    },
}

fn malformed_message(message: &str, position: &Option<TextPosition>) -> String {
    match position {
        Some(pos) => format!("The NZB document is malformed at {pos}: {message}"),
        None => format!("The NZB document is malformed: {message}"),
    }
}

impl ParseNzbError {
    pub(crate) fn malformed(message: impl Into<String>, position: Option<TextPosition>) -> Self {
        ParseNzbError::MalformedDocument {
            message: message.into(),
            position,
        }
    }
}

#[derive(Error, Debug)]
/// Represents errors that can occur when an NZB has to be read from a file or stream first.
pub enum ParseNzbFileError {
    /// Input/Output error encountered while trying to access or read the NZB file.
    #[error("I/O error while accessing file '{file}': {source}")]
    Io {
        /// The underlying I/O error that occurred.
        source: io::Error,
        /// The path to the file that was being accessed when the error occurred.
        file: PathBuf,
    },

    /// Error while reading from a caller supplied reader.
    #[error("I/O error while reading NZB data: {source}")]
    Read {
        /// The underlying I/O error, unchanged.
        source: io::Error,
    },

    /// Error during Gzip decompression of the NZB file.
    #[error("Gzip decompression error for file '{file}': {source}")]
    Gzip {
        /// The underlying I/O error reported by the Gzip decompression process.
        source: io::Error,
        /// The path to the file that was being decompressed when the error occurred.
        file: PathBuf,
    },

    ///  Error encountered during the core NZB parsing logic.
    #[error("NZB parsing error: {source}")]
    Parse {
        /// The specific NZB parsing error.
        source: ParseNzbError,
    },
}

impl ParseNzbFileError {
    pub(crate) fn from_io_err(source: io::Error, file: impl Into<PathBuf>) -> Self {
        ParseNzbFileError::Io {
            source,
            file: file.into(),
        }
    }

    pub(crate) fn from_gzip_err(source: io::Error, file: impl Into<PathBuf>) -> Self {
        ParseNzbFileError::Gzip {
            source,
            file: file.into(),
        }
    }
}

impl From<ParseNzbError> for ParseNzbFileError {
    fn from(source: ParseNzbError) -> Self {
        ParseNzbFileError::Parse { source }
    }
}
