//! Binary serialization of value graphs as Avro object container files.
//!
//! Wire format essentials: int and long are zigzag varints, floats are
//! little-endian IEEE bytes, strings are length-framed UTF-8, records are
//! their fields concatenated in schema order, arrays are one count-framed
//! block followed by a zero terminator, and unions are a zigzag branch index
//! followed by the branch value. The container frames a single data block
//! between sync markers; only the `null` codec is produced.

use std::io::Write;

use sha2::{Digest, Sha256};

use crate::schema::{FieldSchema, Schema};
use crate::value::Value;

/// Failures while serializing a value graph against its schema.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("record field `{field}` has no value, no default, and no null branch")]
    MissingField { field: String },

    #[error("value does not match schema: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("union has no branch for a {0} value")]
    NoUnionBranch(String),
}

const MAGIC: &[u8; 4] = b"Obj\x01";
const SYNC_MARKER_LEN: usize = 16;

/// Writes `value` as a single-datum Avro object container file.
pub fn write_container(
    value: &Value,
    schema: &Schema,
    out: &mut impl Write,
) -> Result<(), WriteError> {
    let schema_json = schema.to_json().to_string();
    let sync = sync_marker(&schema_json);

    let mut datum = Vec::new();
    write_value(value, schema, &mut datum)?;

    out.write_all(MAGIC)?;

    // File metadata: one map block holding the schema and the codec, then
    // the end-of-map zero.
    let mut header = Vec::new();
    write_long(2, &mut header);
    write_str("avro.schema", &mut header);
    write_str(&schema_json, &mut header);
    write_str("avro.codec", &mut header);
    write_str("null", &mut header);
    write_long(0, &mut header);
    out.write_all(&header)?;
    out.write_all(&sync)?;

    // One data block: object count, byte length, the datum, sync.
    let mut block = Vec::new();
    write_long(1, &mut block);
    write_long(datum.len() as i64, &mut block);
    out.write_all(&block)?;
    out.write_all(&datum)?;
    out.write_all(&sync)?;
    Ok(())
}

/// [`write_container`] into a fresh buffer.
pub fn to_vec(value: &Value, schema: &Schema) -> Result<Vec<u8>, WriteError> {
    let mut out = Vec::new();
    write_container(value, schema, &mut out)?;
    Ok(out)
}

/// The container sync marker, derived from the schema so that a given
/// schema always produces byte-identical output.
fn sync_marker(schema_json: &str) -> [u8; SYNC_MARKER_LEN] {
    let digest = Sha256::digest(schema_json.as_bytes());
    let mut marker = [0u8; SYNC_MARKER_LEN];
    marker.copy_from_slice(&digest[..SYNC_MARKER_LEN]);
    marker
}

fn write_value(value: &Value, schema: &Schema, out: &mut Vec<u8>) -> Result<(), WriteError> {
    match (schema, value) {
        (Schema::Null, Value::Null) => Ok(()),
        (Schema::Boolean, Value::Boolean(value)) => {
            out.push(u8::from(*value));
            Ok(())
        }
        (Schema::Int, Value::Int(value)) => {
            write_long(i64::from(*value), out);
            Ok(())
        }
        (Schema::Long, Value::Long(value)) => {
            write_long(*value, out);
            Ok(())
        }
        (Schema::Float, Value::Float(value)) => {
            out.extend_from_slice(&value.to_le_bytes());
            Ok(())
        }
        (Schema::Double, Value::Double(value)) => {
            out.extend_from_slice(&value.to_le_bytes());
            Ok(())
        }
        (Schema::String, Value::String(value)) => {
            write_str(value, out);
            Ok(())
        }
        (Schema::Array(items), Value::Array(values)) => {
            if !values.is_empty() {
                write_long(values.len() as i64, out);
                for value in values {
                    write_value(value, items, out)?;
                }
            }
            write_long(0, out);
            Ok(())
        }
        (Schema::Record(record), Value::Record(fields)) => {
            for field in &record.fields {
                match fields.get(&field.name) {
                    Some(value) => write_value(value, &field.schema, out)?,
                    None => write_missing_field(field, out)?,
                }
            }
            Ok(())
        }
        (Schema::Union(branches), value) => {
            let index = branches
                .iter()
                .position(|branch| branch_accepts(branch, value))
                .ok_or_else(|| WriteError::NoUnionBranch(describe(value).to_string()))?;
            write_long(index as i64, out);
            write_value(value, &branches[index], out)
        }
        (schema, value) => Err(WriteError::SchemaMismatch {
            expected: schema.kind().to_string(),
            actual: describe(value).to_string(),
        }),
    }
}

/// An absent record slot serializes as the null branch when its schema has
/// one, else as the declared default.
fn write_missing_field(field: &FieldSchema, out: &mut Vec<u8>) -> Result<(), WriteError> {
    if let Schema::Union(branches) = &field.schema {
        if let Some(index) = branches.iter().position(|branch| matches!(branch, Schema::Null)) {
            write_long(index as i64, out);
            return Ok(());
        }
    }
    if let Some(default) = &field.default {
        return write_value(default, &field.schema, out);
    }
    Err(WriteError::MissingField {
        field: field.name.clone(),
    })
}

fn branch_accepts(branch: &Schema, value: &Value) -> bool {
    matches!(
        (branch, value),
        (Schema::Null, Value::Null)
            | (Schema::Boolean, Value::Boolean(_))
            | (Schema::Int, Value::Int(_))
            | (Schema::Long, Value::Long(_))
            | (Schema::Float, Value::Float(_))
            | (Schema::Double, Value::Double(_))
            | (Schema::String, Value::String(_))
            | (Schema::Array(_), Value::Array(_))
            | (Schema::Record(_), Value::Record(_))
    )
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Boolean(_) => "boolean",
        Value::Int(_) => "int",
        Value::Long(_) => "long",
        Value::Float(_) => "float",
        Value::Double(_) => "double",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Record(_) => "record",
    }
}

/// Zigzag-then-varint encoding, shared by int and long.
fn write_long(value: i64, out: &mut Vec<u8>) {
    let mut encoded = ((value << 1) ^ (value >> 63)) as u64;
    loop {
        let byte = (encoded & 0x7f) as u8;
        encoded >>= 7;
        if encoded == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn write_str(text: &str, out: &mut Vec<u8>) {
    write_long(text.len() as i64, out);
    out.extend_from_slice(text.as_bytes());
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn encoded_long(value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        write_long(value, &mut out);
        out
    }

    #[test]
    fn zigzag_varint_vectors() {
        assert_eq!(encoded_long(0), [0x00]);
        assert_eq!(encoded_long(-1), [0x01]);
        assert_eq!(encoded_long(1), [0x02]);
        assert_eq!(encoded_long(-2), [0x03]);
        assert_eq!(encoded_long(63), [0x7e]);
        assert_eq!(encoded_long(64), [0x80, 0x01]);
        assert_eq!(encoded_long(-64), [0x7f]);
        let mut widest = vec![0xff; 9];
        widest.push(0x01);
        assert_eq!(encoded_long(i64::MIN), widest);
    }

    #[test]
    fn string_is_length_framed() {
        let mut out = Vec::new();
        write_value(
            &Value::String("hi".to_string()),
            &Schema::String,
            &mut out,
        )
        .unwrap();
        assert_eq!(out, [0x04, b'h', b'i']);
    }

    #[test]
    fn booleans_are_single_bytes() {
        let mut out = Vec::new();
        write_value(&Value::Boolean(true), &Schema::Boolean, &mut out).unwrap();
        write_value(&Value::Boolean(false), &Schema::Boolean, &mut out).unwrap();
        assert_eq!(out, [0x01, 0x00]);
    }

    #[test]
    fn array_is_one_block_and_a_terminator() {
        let mut out = Vec::new();
        write_value(
            &Value::Array(vec![Value::Int(1), Value::Int(2)]),
            &Schema::Array(Box::new(Schema::Int)),
            &mut out,
        )
        .unwrap();
        // count 2, items 1 and 2 zigzagged, end of blocks.
        assert_eq!(out, [0x04, 0x02, 0x04, 0x00]);
    }

    #[test]
    fn empty_array_is_just_the_terminator() {
        let mut out = Vec::new();
        write_value(
            &Value::Array(Vec::new()),
            &Schema::Array(Box::new(Schema::Int)),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, [0x00]);
    }

    #[test]
    fn union_writes_the_branch_index_first() {
        let union = Schema::Union(vec![Schema::Null, Schema::String]);
        let mut out = Vec::new();
        write_value(&Value::String("x".to_string()), &union, &mut out).unwrap();
        // branch 1 zigzagged, then the string.
        assert_eq!(out, [0x02, 0x02, b'x']);

        out.clear();
        write_value(&Value::Null, &union, &mut out).unwrap();
        assert_eq!(out, [0x00]);
    }

    #[test]
    fn union_with_no_matching_branch_fails() {
        let union = Schema::Union(vec![Schema::Null, Schema::String]);
        let mut out = Vec::new();
        let err = write_value(&Value::Int(1), &union, &mut out).unwrap_err();
        assert!(matches!(err, WriteError::NoUnionBranch(_)));
    }

    #[test]
    fn absent_nullable_field_writes_the_null_branch() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "maybe", "type": ["null", "string"]}
            ]}"#,
        )
        .unwrap();
        let mut out = Vec::new();
        write_value(&Value::Record(IndexMap::new()), &schema, &mut out).unwrap();
        assert_eq!(out, [0x00]);
    }

    #[test]
    fn absent_field_without_fallback_fails() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [
                {"name": "required", "type": "string"}
            ]}"#,
        )
        .unwrap();
        let mut out = Vec::new();
        let err = write_value(&Value::Record(IndexMap::new()), &schema, &mut out).unwrap_err();
        assert!(matches!(err, WriteError::MissingField { field } if field == "required"));
    }

    #[test]
    fn mismatched_value_fails() {
        let mut out = Vec::new();
        let err = write_value(&Value::Int(1), &Schema::String, &mut out).unwrap_err();
        assert!(matches!(err, WriteError::SchemaMismatch { .. }));
    }

    #[test]
    fn container_starts_with_the_magic() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [{"name": "x", "type": "int"}]}"#,
        )
        .unwrap();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Int(3));

        let bytes = to_vec(&Value::Record(fields), &schema).unwrap();
        assert_eq!(&bytes[..4], b"Obj\x01");
        // Metadata map opens with an entry count of 2.
        assert_eq!(bytes[4], 0x04);
    }

    #[test]
    fn container_output_is_deterministic() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [{"name": "x", "type": "int"}]}"#,
        )
        .unwrap();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Int(3));
        let value = Value::Record(fields);

        assert_eq!(to_vec(&value, &schema).unwrap(), to_vec(&value, &schema).unwrap());
    }

    #[test]
    fn container_ends_with_the_sync_marker_twice() {
        let schema = Schema::parse_str(
            r#"{"type": "record", "name": "R", "fields": [{"name": "x", "type": "int"}]}"#,
        )
        .unwrap();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Int(3));

        let bytes = to_vec(&Value::Record(fields), &schema).unwrap();
        let sync = sync_marker(&schema.to_json().to_string());
        assert_eq!(&bytes[bytes.len() - 16..], sync);
        // The same marker separates the header from the data block.
        let datum_len = 1; // Int(3) is one zigzag byte
        let block_prefix = 2; // count 1 + length varints
        let header_end = bytes.len() - 16 - datum_len - block_prefix - 16;
        assert_eq!(&bytes[header_end..header_end + 16], sync);
    }
}
