//! Condition documents: the portable filter format.
//!
//! A document maps field names to either a literal (equality) or an
//! operator map, plus the logical key `or` holding a list of documents:
//!
//! ```text
//! { "age": { "gt": 22 }, "city": "Seattle", "or": [ { "age": 19 } ] }
//! ```
//!
//! Documents are built with [`Document`]'s builder methods or parsed from
//! `serde_json` values through [`IntoDocument`].

use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// Right-hand side of an operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single value.
    Value(Value),
    /// A list of values, for `in` / `nin`.
    List(Vec<Value>),
}

impl Operand {
    /// A list operand.
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<T> for Operand {
    fn from(value: T) -> Self {
        Operand::Value(value.into())
    }
}

/// What a document key maps to.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Equality against a literal.
    Literal(Value),
    /// Operator name to operand, conjoined.
    Operators(Vec<(String, Operand)>),
    /// Sub-documents, used under the `or` key.
    Documents(Vec<Document>),
}

/// A condition document. Keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Node)>,
}

impl Document {
    /// An empty document, matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `field == value`.
    #[must_use]
    pub fn field(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, Node::Literal(value.into()))
    }

    /// Adds `field <operator> operand`. Consecutive operators on the same
    /// field share one operator map.
    #[must_use]
    pub fn op(
        mut self,
        field: impl Into<String>,
        operator: impl Into<String>,
        operand: impl Into<Operand>,
    ) -> Self {
        let field = field.into();
        let pair = (operator.into(), operand.into());
        if let Some((key, Node::Operators(ops))) = self.entries.last_mut() {
            if *key == field {
                ops.push(pair);
                return self;
            }
        }
        self.insert(field, Node::Operators(vec![pair]))
    }

    /// Adds a disjunction of `documents`.
    #[must_use]
    pub fn or(self, documents: impl IntoIterator<Item = Document>) -> Self {
        self.insert("or", Node::Documents(documents.into_iter().collect()))
    }

    /// Adds a raw entry.
    #[must_use]
    pub fn insert(mut self, key: impl Into<String>, node: Node) -> Self {
        self.entries.push((key.into(), node));
        self
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[(String, Node)] {
        &self.entries
    }

    /// Whether the document has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a JSON object.
    ///
    /// # Errors
    ///
    /// `InvalidCondition` when the value is not an object, `or` does not
    /// hold a list of objects, a field maps to a list, or a literal is not a
    /// primitive.
    pub fn from_json(json: &serde_json::Value) -> CoreResult<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| CoreError::invalid_condition("condition must be an object"))?;

        let mut entries = Vec::with_capacity(object.len());
        for (key, value) in object {
            let node = if is_or_key(key) {
                let list = value.as_array().ok_or_else(|| {
                    CoreError::invalid_condition(format!("{key} expects a list of conditions"))
                })?;
                Node::Documents(list.iter().map(Document::from_json).collect::<CoreResult<_>>()?)
            } else {
                match value {
                    serde_json::Value::Object(ops) => Node::Operators(
                        ops.iter()
                            .map(|(op, operand)| Ok((op.clone(), json_operand(key, operand)?)))
                            .collect::<CoreResult<_>>()?,
                    ),
                    serde_json::Value::Array(_) => {
                        return Err(CoreError::invalid_condition(format!(
                            "field {key} maps to a list; use the in operator"
                        )))
                    }
                    literal => Node::Literal(json_value(key, literal)?),
                }
            };
            entries.push((key.clone(), node));
        }
        Ok(Self { entries })
    }
}

/// Whether `key` is the disjunction key.
pub(crate) fn is_or_key(key: &str) -> bool {
    key == "or" || key == "$or"
}

fn json_operand(field: &str, json: &serde_json::Value) -> CoreResult<Operand> {
    match json {
        serde_json::Value::Array(items) => Ok(Operand::List(
            items
                .iter()
                .map(|item| json_value(field, item))
                .collect::<CoreResult<_>>()?,
        )),
        other => Ok(Operand::Value(json_value(field, other)?)),
    }
}

fn json_value(field: &str, json: &serde_json::Value) -> CoreResult<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null)),
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        _ => Err(CoreError::invalid_condition(format!(
            "value for {field} must be a primitive"
        ))),
    }
}

/// Things usable as a condition document.
pub trait IntoDocument {
    /// Converts into a [`Document`].
    ///
    /// # Errors
    ///
    /// `InvalidCondition` for malformed input.
    fn into_document(self) -> CoreResult<Document>;
}

impl IntoDocument for Document {
    fn into_document(self) -> CoreResult<Document> {
        Ok(self)
    }
}

impl IntoDocument for &Document {
    fn into_document(self) -> CoreResult<Document> {
        Ok(self.clone())
    }
}

impl IntoDocument for serde_json::Value {
    fn into_document(self) -> CoreResult<Document> {
        Document::from_json(&self)
    }
}

impl IntoDocument for &serde_json::Value {
    fn into_document(self) -> CoreResult<Document> {
        Document::from_json(self)
    }
}
