//! Schema-driven conversion of document trees into Avro value graphs, and
//! their serialization as Avro object container files.
//!
//! The pipeline this crate covers: a [`xavro_document::DocumentNode`] plus a
//! parsed [`Schema`] go through the [`Encoder`], which resolves union
//! branches, injects schema-declared defaults, coerces scalar text into
//! typed scalars and recursively materializes records and arrays. The
//! resulting [`Value`] graph is written out by [`write_container`].
//!
//! Fatal conditions (cardinality mismatches, unparseable scalars) abort the
//! conversion; lossy-but-tolerated conditions (fields the schema has no slot
//! for, coercions with no rule) are logged and counted in [`Diagnostics`].

pub mod datetime;
mod encode;
mod schema;
mod value;
mod writer;

pub use encode::{Diagnostics, EncodeError, Encoder, encode};
pub use schema::{FieldSchema, RecordSchema, Schema, SchemaError, SchemaKind};
pub use value::Value;
pub use writer::{WriteError, to_vec, write_container};
