use thiserror::Error;

/// Errors surfaced while reading XML into a document tree.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("invalid UTF-8 in CDATA section: {0}")]
    NonUtf8(#[from] std::str::Utf8Error),

    #[error("document has no root element")]
    MissingRoot,
}
