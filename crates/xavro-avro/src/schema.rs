use core::fmt;

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};

use crate::value::Value;

/// The structural type descriptor the encoder targets.
///
/// A closed set of variants: primitives, records, arrays and ordered unions.
/// Keeping the set closed is what makes union resolution and the coercion
/// table exhaustive and statically checkable.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Record(RecordSchema),
    Array(Box<Schema>),
    Union(Vec<Schema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub schema: Schema,
    /// Declared fallback emitted when the source tree has no data for the
    /// field. Converted from its JSON literal at parse time; the encoder
    /// emits it verbatim, without coercion.
    pub default: Option<Value>,
}

/// Schema kinds, the dispatch alphabet for union matching and coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Null,
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Record,
    Array,
    Union,
}

impl SchemaKind {
    /// Kinds a union candidate may match against a scalar-bearing value.
    /// `Null` is deliberately absent: a null branch is only ever reached
    /// through the first-candidate fallback.
    pub const PRIMITIVE: &'static [SchemaKind] = &[
        SchemaKind::String,
        SchemaKind::Int,
        SchemaKind::Long,
        SchemaKind::Float,
        SchemaKind::Double,
        SchemaKind::Boolean,
    ];

    /// Kinds accepted unconditionally during union matching.
    pub const COMPLEX: &'static [SchemaKind] = &[SchemaKind::Array, SchemaKind::Record];

    pub fn is_primitive(self) -> bool {
        Self::PRIMITIVE.contains(&self)
    }

    pub fn is_complex(self) -> bool {
        Self::COMPLEX.contains(&self)
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaKind::Null => "null",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Int => "int",
            SchemaKind::Long => "long",
            SchemaKind::Float => "float",
            SchemaKind::Double => "double",
            SchemaKind::String => "string",
            SchemaKind::Record => "record",
            SchemaKind::Array => "array",
            SchemaKind::Union => "union",
        };
        f.write_str(name)
    }
}

/// Errors reading a schema document.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("union with no branches")]
    EmptyUnion,

    #[error("{0} declaration is missing `{1}`")]
    MissingAttribute(&'static str, &'static str),

    #[error("default for field `{field}` does not match its declared type")]
    DefaultMismatch { field: String },

    #[error("unexpected schema JSON: {0}")]
    Malformed(String),
}

impl Schema {
    pub fn kind(&self) -> SchemaKind {
        match self {
            Schema::Null => SchemaKind::Null,
            Schema::Boolean => SchemaKind::Boolean,
            Schema::Int => SchemaKind::Int,
            Schema::Long => SchemaKind::Long,
            Schema::Float => SchemaKind::Float,
            Schema::Double => SchemaKind::Double,
            Schema::String => SchemaKind::String,
            Schema::Record(_) => SchemaKind::Record,
            Schema::Array(_) => SchemaKind::Array,
            Schema::Union(_) => SchemaKind::Union,
        }
    }

    /// Parses an `.avsc` schema document.
    pub fn parse_str(input: &str) -> Result<Schema, SchemaError> {
        let json: JsonValue = serde_json::from_str(input)?;
        Self::parse_value(&json)
    }

    /// Parses an already-deserialized schema document.
    pub fn parse_value(json: &JsonValue) -> Result<Schema, SchemaError> {
        let mut names = IndexMap::new();
        parse_schema(json, &mut names)
    }

    /// Re-serializes the schema as `.avsc` JSON, e.g. for a container file
    /// header.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Schema::Null => json!("null"),
            Schema::Boolean => json!("boolean"),
            Schema::Int => json!("int"),
            Schema::Long => json!("long"),
            Schema::Float => json!("float"),
            Schema::Double => json!("double"),
            Schema::String => json!("string"),
            Schema::Record(record) => {
                let fields: Vec<JsonValue> = record
                    .fields
                    .iter()
                    .map(|field| {
                        let mut out = serde_json::Map::new();
                        out.insert("name".to_string(), json!(field.name));
                        out.insert("type".to_string(), field.schema.to_json());
                        if let Some(default) = &field.default {
                            out.insert("default".to_string(), value_to_json(default));
                        }
                        JsonValue::Object(out)
                    })
                    .collect();
                json!({ "type": "record", "name": record.name, "fields": fields })
            }
            Schema::Array(items) => json!({ "type": "array", "items": items.to_json() }),
            Schema::Union(branches) => {
                JsonValue::Array(branches.iter().map(Schema::to_json).collect())
            }
        }
    }
}

type Names = IndexMap<String, Schema>;

fn parse_schema(json: &JsonValue, names: &mut Names) -> Result<Schema, SchemaError> {
    match json {
        JsonValue::String(name) => parse_named(name, names),
        JsonValue::Array(branches) => {
            if branches.is_empty() {
                return Err(SchemaError::EmptyUnion);
            }
            let branches = branches
                .iter()
                .map(|branch| parse_schema(branch, names))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Schema::Union(branches))
        }
        JsonValue::Object(declaration) => parse_declaration(declaration, names),
        other => Err(SchemaError::Malformed(other.to_string())),
    }
}

/// Resolves a primitive type name, or a back reference to a previously
/// declared record.
fn parse_named(name: &str, names: &Names) -> Result<Schema, SchemaError> {
    match name {
        "null" => Ok(Schema::Null),
        "boolean" => Ok(Schema::Boolean),
        "int" => Ok(Schema::Int),
        "long" => Ok(Schema::Long),
        "float" => Ok(Schema::Float),
        "double" => Ok(Schema::Double),
        "string" => Ok(Schema::String),
        reference => names
            .get(reference)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownType(reference.to_string())),
    }
}

fn parse_declaration(
    declaration: &serde_json::Map<String, JsonValue>,
    names: &mut Names,
) -> Result<Schema, SchemaError> {
    let type_name = declaration
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or(SchemaError::MissingAttribute("schema", "type"))?;

    match type_name {
        "record" => {
            let name = declaration
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or(SchemaError::MissingAttribute("record", "name"))?;
            let declared_fields = declaration
                .get("fields")
                .and_then(JsonValue::as_array)
                .ok_or(SchemaError::MissingAttribute("record", "fields"))?;

            let mut fields = Vec::with_capacity(declared_fields.len());
            for declared in declared_fields {
                fields.push(parse_field(declared, names)?);
            }
            let schema = Schema::Record(RecordSchema {
                name: name.to_string(),
                fields,
            });
            names.insert(name.to_string(), schema.clone());
            Ok(schema)
        }
        "array" => {
            let items = declaration
                .get("items")
                .ok_or(SchemaError::MissingAttribute("array", "items"))?;
            Ok(Schema::Array(Box::new(parse_schema(items, names)?)))
        }
        // A primitive spelled in object form, possibly carrying a
        // `logicalType` attribute. Logical types are ignored: date-time
        // handling is the `T` heuristic on long fields, not an annotation.
        primitive => parse_named(primitive, names),
    }
}

fn parse_field(declared: &JsonValue, names: &mut Names) -> Result<FieldSchema, SchemaError> {
    let name = declared
        .get("name")
        .and_then(JsonValue::as_str)
        .ok_or(SchemaError::MissingAttribute("field", "name"))?
        .to_string();
    let declared_type = declared
        .get("type")
        .ok_or(SchemaError::MissingAttribute("field", "type"))?;
    let schema = parse_schema(declared_type, names)?;

    let default = match declared.get("default") {
        Some(literal) => Some(
            default_value(literal, &schema)
                .ok_or_else(|| SchemaError::DefaultMismatch { field: name.clone() })?,
        ),
        None => None,
    };

    Ok(FieldSchema {
        name,
        schema,
        default,
    })
}

/// Converts a field's JSON default literal into a properly typed value so
/// the encoder can emit it without touching it.
fn default_value(literal: &JsonValue, schema: &Schema) -> Option<Value> {
    // Defaults for union fields are declared against the first branch.
    let schema = match schema {
        Schema::Union(branches) => branches.first()?,
        other => other,
    };
    match (schema, literal) {
        (Schema::Null, JsonValue::Null) => Some(Value::Null),
        (Schema::Boolean, JsonValue::Bool(value)) => Some(Value::Boolean(*value)),
        (Schema::Int, JsonValue::Number(value)) => value
            .as_i64()
            .and_then(|wide| i32::try_from(wide).ok())
            .map(Value::Int),
        (Schema::Long, JsonValue::Number(value)) => value.as_i64().map(Value::Long),
        (Schema::Float, JsonValue::Number(value)) => {
            value.as_f64().map(|wide| Value::Float(wide as f32))
        }
        (Schema::Double, JsonValue::Number(value)) => value.as_f64().map(Value::Double),
        (Schema::String, JsonValue::String(value)) => Some(Value::String(value.clone())),
        (Schema::Array(items), JsonValue::Array(values)) => values
            .iter()
            .map(|value| default_value(value, items))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        (Schema::Record(record), JsonValue::Object(values)) => {
            let mut fields = IndexMap::new();
            for field in &record.fields {
                let value = values
                    .get(&field.name)
                    .and_then(|literal| default_value(literal, &field.schema))
                    .or_else(|| field.default.clone())?;
                fields.insert(field.name.clone(), value);
            }
            Some(Value::Record(fields))
        }
        _ => None,
    }
}

fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => json!(*b),
        Value::Int(i) => json!(*i),
        Value::Long(l) => json!(*l),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => json!(s),
        Value::Array(items) => JsonValue::Array(items.iter().map(value_to_json).collect()),
        Value::Record(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value)))
                .collect(),
        ),
    }
}
