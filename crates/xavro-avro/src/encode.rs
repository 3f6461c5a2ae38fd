use core::fmt;

use indexmap::IndexMap;
use xavro_document::DocumentNode;

use crate::datetime;
use crate::schema::{RecordSchema, Schema, SchemaKind};
use crate::value::Value;

/// Fatal conversion failures. No partial value graph is produced once one of
/// these occurs; non-fatal conditions go to [`Diagnostics`] instead.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("top-level schema must be a record, got {0}")]
    TopLevelNotRecord(SchemaKind),

    #[error(transparent)]
    Ambiguous(#[from] xavro_document::AmbiguousField),

    #[error("field `{field}`: cannot parse `{text}` as {target}: {reason}")]
    MalformedScalar {
        field: String,
        text: String,
        target: SchemaKind,
        reason: String,
    },

    #[error("field `{field}`: {target} expected but the node has no text value")]
    MissingScalar { field: String, target: SchemaKind },
}

/// Non-fatal conditions absorbed during a conversion.
///
/// Each occurrence is also emitted as a `tracing` warning at the point it
/// happens; the counters let callers report totals without a subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Tree fields dropped because the schema has no slot for them.
    pub unschematized_fields: usize,
    /// Coercions that hit a schema kind with no rule and yielded no value.
    pub unsupported_coercions: usize,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.unschematized_fields == 0 && self.unsupported_coercions == 0
    }
}

/// Schema-driven encoder from document trees to value graphs.
///
/// One instance covers one conversion; [`Encoder::diagnostics`] reports what
/// was absorbed along the way.
pub struct Encoder<'s> {
    schema: &'s Schema,
    diagnostics: Diagnostics,
}

/// Converts a document tree against `schema`, discarding diagnostics. Use
/// [`Encoder`] directly to inspect them.
pub fn encode(root: &DocumentNode, schema: &Schema) -> Result<Value, EncodeError> {
    Encoder::new(schema).encode(root)
}

impl<'s> Encoder<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Converts `root` against the schema. Defined only for record schemas
    /// at the top level.
    pub fn encode(&mut self, root: &DocumentNode) -> Result<Value, EncodeError> {
        let schema = self.schema;
        match schema {
            Schema::Record(record) => self.encode_record(root, record),
            other => Err(EncodeError::TopLevelNotRecord(other.kind())),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn encode_record(
        &mut self,
        node: &DocumentNode,
        record: &RecordSchema,
    ) -> Result<Value, EncodeError> {
        let mut out = IndexMap::new();

        for field in &record.fields {
            let values = node.values(&field.name);

            // The binary layer cannot populate defaults itself, so inject
            // them here whenever the tree has nothing for the field. The
            // stored default is already properly typed; emit it verbatim.
            if values.is_empty() {
                if let Some(default) = &field.default {
                    out.insert(field.name.clone(), default.clone());
                }
                continue;
            }

            let field_schema = match &field.schema {
                Schema::Union(branches) => match resolve_union(values, branches) {
                    Some(branch) => branch,
                    None => {
                        tracing::warn!(field = %field.name, "union with no branches, leaving the field unset");
                        self.diagnostics.unsupported_coercions += 1;
                        continue;
                    }
                },
                other => other,
            };

            let encoded = match field_schema {
                Schema::Array(items) => Some(self.encode_array(values, items, &field.name)?),
                Schema::Record(nested) => {
                    let single = DocumentNode::ensure_single(values, &field.name)?;
                    Some(self.encode_record(single, nested)?)
                }
                primitive => {
                    let single = DocumentNode::ensure_single(values, &field.name)?;
                    self.coerce_scalar(single.scalar_text(), primitive.kind(), &field.name)?
                }
            };

            if let Some(value) = encoded {
                out.insert(field.name.clone(), value);
            }
        }

        // Keys the schema has no slot for are dropped, deliberately lossy:
        // over-specified documents pass with a warning.
        for key in node.keys() {
            if !record.fields.iter().any(|field| field.name == key) {
                tracing::warn!(field = key, record = %record.name, "field not present in the schema, dropping");
                self.diagnostics.unschematized_fields += 1;
            }
        }

        Ok(Value::Record(out))
    }

    fn encode_array(
        &mut self,
        values: &[DocumentNode],
        items: &Schema,
        field: &str,
    ) -> Result<Value, EncodeError> {
        let mut out = Vec::with_capacity(values.len());
        match items {
            Schema::Record(nested) => {
                for value in values {
                    out.push(self.encode_record(value, nested)?);
                }
            }
            // Arrays of arrays or of unions are not supported; the per-item
            // coercion reports them and they come out as null entries.
            other => {
                for value in values {
                    let coerced = self.coerce_scalar(value.scalar_text(), other.kind(), field)?;
                    out.push(coerced.unwrap_or(Value::Null));
                }
            }
        }
        Ok(Value::Array(out))
    }

    /// The primitive coercion table. `Ok(None)` means "no value": the slot
    /// stays out of the record, or becomes a null entry inside an array.
    fn coerce_scalar(
        &mut self,
        text: Option<&str>,
        target: SchemaKind,
        field: &str,
    ) -> Result<Option<Value>, EncodeError> {
        match target {
            // A null target always coerces to nothing; this is the landing
            // spot when union resolution fell back to a leading null branch,
            // and an empty field is fine there.
            SchemaKind::Null => Ok(None),
            SchemaKind::String => match text {
                Some(text) => Ok(Some(Value::String(text.to_string()))),
                None => {
                    tracing::warn!(field, "string field has no text value, leaving it unset");
                    self.diagnostics.unsupported_coercions += 1;
                    Ok(None)
                }
            },
            SchemaKind::Int => {
                let text = require_text(text, target, field)?;
                text.parse::<i32>()
                    .map(|parsed| Some(Value::Int(parsed)))
                    .map_err(|source| malformed(field, text, target, source))
            }
            SchemaKind::Long => {
                let text = require_text(text, target, field)?;
                if datetime::looks_like_datetime(text) {
                    datetime::parse_datetime_millis(text)
                        .map(|millis| Some(Value::Long(millis)))
                        .map_err(|source| malformed(field, text, target, source))
                } else {
                    text.parse::<i64>()
                        .map(|parsed| Some(Value::Long(parsed)))
                        .map_err(|source| malformed(field, text, target, source))
                }
            }
            SchemaKind::Float => {
                let text = require_text(text, target, field)?;
                text.parse::<f32>()
                    .map(|parsed| Some(Value::Float(parsed)))
                    .map_err(|source| malformed(field, text, target, source))
            }
            SchemaKind::Double => {
                let text = require_text(text, target, field)?;
                text.parse::<f64>()
                    .map(|parsed| Some(Value::Double(parsed)))
                    .map_err(|source| malformed(field, text, target, source))
            }
            SchemaKind::Boolean => {
                let text = require_text(text, target, field)?;
                Ok(Some(Value::Boolean(text.eq_ignore_ascii_case("true"))))
            }
            SchemaKind::Record | SchemaKind::Array | SchemaKind::Union => {
                tracing::warn!(field, kind = %target, "no coercion rule for this schema kind, leaving the value unset");
                self.diagnostics.unsupported_coercions += 1;
                Ok(None)
            }
        }
    }
}

/// Picks one concrete candidate from an ordered union.
///
/// Inspects only the first value and never backtracks: if the first value
/// does not represent the shape of later ones, encoding silently
/// mis-selects. Downstream consumers depend on this exact behavior, so it
/// stays a heuristic rather than type inference.
fn resolve_union<'s>(values: &[DocumentNode], branches: &'s [Schema]) -> Option<&'s Schema> {
    // With no values to inspect (the default-only case) the first branch
    // wins; conventionally that is null or the most permissive type.
    let Some(first) = values.first() else {
        return branches.first();
    };
    branches
        .iter()
        .find(|candidate| candidate_matches(first, candidate))
        // No match usually means an empty field and a leading null branch.
        .or_else(|| branches.first())
}

fn candidate_matches(node: &DocumentNode, candidate: &Schema) -> bool {
    let kind = candidate.kind();
    // Primitive branches need data to coerce; complex branches are accepted
    // on faith, with no deeper check against the candidate's own shape.
    (kind.is_primitive() && node.scalar_text().is_some()) || kind.is_complex()
}

fn require_text<'a>(
    text: Option<&'a str>,
    target: SchemaKind,
    field: &str,
) -> Result<&'a str, EncodeError> {
    text.ok_or_else(|| EncodeError::MissingScalar {
        field: field.to_string(),
        target,
    })
}

fn malformed(field: &str, text: &str, target: SchemaKind, source: impl fmt::Display) -> EncodeError {
    EncodeError::MalformedScalar {
        field: field.to_string(),
        text: text.to_string(),
        target,
        reason: source.to_string(),
    }
}
