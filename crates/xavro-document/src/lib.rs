//! The generic intermediate tree built from a markup document, prior to
//! schema-aware encoding.
//!
//! [`DocumentNode`] merges tag children and attributes into one ordered,
//! multi-valued field namespace. Keys are always strings, values are always
//! nodes, and cardinality (one vs. many) is an emergent property of sequence
//! length, checked by the encoder rather than the tree.

mod node;

pub use node::{AmbiguousField, DocumentNode};
