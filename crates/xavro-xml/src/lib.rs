//! Builds [`xavro_document::DocumentNode`] trees from XML.
//!
//! This crate wraps [`quick-xml`]'s event stream and merges each element's
//! attributes and child elements into the tree's single name-keyed
//! namespace. It has no domain errors of its own; malformed markup is
//! rejected by the underlying reader.
//!
//! [`quick-xml`]: https://docs.rs/quick-xml

mod builder;
mod error;

pub use builder::{parse, parse_reader};
pub use error::XmlError;
