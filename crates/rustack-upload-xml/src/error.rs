//! Codec errors.

use std::io;

/// Why a body could not be written or read.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// The writer failed while producing a body.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The body is not well-formed XML.
    #[error("malformed XML: {0}")]
    QuickXml(#[from] quick_xml::Error),

    /// A required element is absent, e.g. `ETag` inside a manifest `Part`.
    #[error("missing required XML element: {0}")]
    MissingElement(String),

    /// An element opened where text or a known child was expected.
    #[error("unexpected XML element: {0}")]
    UnexpectedElement(String),

    /// Text content that does not decode or parse, such as a non-numeric
    /// `PartNumber` or an unknown entity reference.
    #[error("failed to parse value: {0}")]
    ParseError(String),
}
