use core::fmt;

use indexmap::IndexMap;

/// A single node of the intermediate document tree.
///
/// Tags and attributes are treated equally: children sharing a name are
/// appended to the same sequence, and a sequence longer than one is what the
/// target schema must model as an array. A node may carry a scalar, fields,
/// or both (an attribute on a text-only element); which interpretation wins
/// cannot be decided without the schema, so it is deferred to the encoder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentNode {
    scalar: Option<String>,
    fields: IndexMap<String, Vec<DocumentNode>>,
}

/// A schema position expected exactly one value but the tree supplied more.
///
/// Signals that the schema under-models the document's cardinality: the
/// document repeats a tag where the schema has a singular slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{count} values for field `{field}` where exactly one is expected; the schema may need an array")]
pub struct AmbiguousField {
    pub field: String,
    pub count: usize,
}

impl DocumentNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a leaf node holding a text value.
    pub fn scalar(text: impl Into<String>) -> Self {
        Self {
            scalar: Some(text.into()),
            fields: IndexMap::new(),
        }
    }

    /// The node's text value, present only for pure-text sources.
    pub fn scalar_text(&self) -> Option<&str> {
        self.scalar.as_deref()
    }

    pub fn set_scalar(&mut self, text: impl Into<String>) {
        self.scalar = Some(text.into());
    }

    /// Appends a named child. Children sharing a name accumulate under the
    /// same key in document order.
    pub fn push_field(&mut self, name: impl Into<String>, child: DocumentNode) {
        self.fields.entry(name.into()).or_default().push(child);
    }

    /// Appends a named child, diverting to `alternate` when `name` is
    /// already occupied. This resolves XML's attribute/element name
    /// collisions; it is not a general renaming scheme.
    pub fn push_field_or(
        &mut self,
        name: impl Into<String>,
        alternate: impl Into<String>,
        child: DocumentNode,
    ) {
        let name = name.into();
        if self.fields.contains_key(&name) {
            self.push_field(alternate.into(), child);
        } else {
            self.push_field(name, child);
        }
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All children under `name`, empty when the field is absent. A node can
    /// be empty while the schema still injects defaults for it, so an absent
    /// key is not an error here.
    pub fn values(&self, name: &str) -> &[DocumentNode] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The single child under `name`.
    pub fn value(&self, name: &str) -> Result<&DocumentNode, AmbiguousField> {
        Self::ensure_single(self.values(name), name)
    }

    /// Checks that a field's sequence holds exactly one node.
    pub fn ensure_single<'a>(
        values: &'a [DocumentNode],
        field: &str,
    ) -> Result<&'a DocumentNode, AmbiguousField> {
        match values {
            [one] => Ok(one),
            other => Err(AmbiguousField {
                field: field.to_string(),
                count: other.len(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scalar.is_none() && self.fields.is_empty()
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        for (name, children) in &self.fields {
            for child in children {
                writeln!(
                    f,
                    "{prefix}{name} : {}",
                    child.scalar.as_deref().unwrap_or("")
                )?;
                child.fmt_indented(f, &format!("{prefix}  "))?;
            }
        }
        Ok(())
    }
}

/// Indented `key : value` dump of the subtree, one line per child.
impl fmt::Display for DocumentNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, "| ")
    }
}
