use indexmap::IndexMap;

/// A schema-conformant output value, ready for binary serialization.
///
/// Every node of the graph matches exactly one schema kind at its structural
/// position. Record fields keep insertion order so that conversions are
/// reproducible.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Array(Vec<Value>),
    Record(IndexMap<String, Value>),
}

impl Value {
    /// The record's field map, when this is a record.
    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(fields) => Some(fields),
            _ => None,
        }
    }
}
