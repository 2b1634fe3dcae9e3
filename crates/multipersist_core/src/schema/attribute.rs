//! Attribute declarations.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// 64-bit signed integer.
    Integer,
    /// UTF-8 text.
    String,
    /// Byte blob.
    Binary,
    /// Double precision float.
    Float,
    /// Boolean.
    Boolean,
    /// UTC timestamp.
    DateTime,
}

impl AttributeType {
    /// Returns true if `value` is acceptable for this type. Null is always
    /// acceptable here; presence is checked separately.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (AttributeType::Integer, Value::Integer(_))
                | (AttributeType::String, Value::Text(_))
                | (AttributeType::Binary, Value::Bytes(_))
                | (AttributeType::Float, Value::Float(_))
                | (AttributeType::Boolean, Value::Bool(_))
                | (AttributeType::DateTime, Value::DateTime(_))
        )
    }

    /// Applies the lossless casts performed on assignment.
    pub(crate) fn cast(self, value: Value) -> Value {
        match (self, value) {
            (AttributeType::Float, Value::Integer(n)) => Value::Float(n as f64),
            (_, value) => value,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Integer => "integer",
            AttributeType::String => "string",
            AttributeType::Binary => "binary",
            AttributeType::Float => "float",
            AttributeType::Boolean => "boolean",
            AttributeType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// A declared attribute of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    ty: AttributeType,
    primary_key: bool,
    unique: bool,
    not_null: bool,
    indexed: bool,
}

impl Attribute {
    /// Declares an attribute with no modifiers.
    pub fn new(name: impl Into<String>, ty: AttributeType) -> Self {
        Self {
            name: name.into(),
            ty,
            primary_key: false,
            unique: false,
            not_null: false,
            indexed: false,
        }
    }

    /// Marks the attribute as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the attribute as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the attribute as required.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Requests a backend index on the attribute.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Semantic type.
    pub fn ty(&self) -> AttributeType {
        self.ty
    }

    /// Whether this is the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Whether values must be unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether a value is required.
    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    /// Whether an index was requested.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }
}
