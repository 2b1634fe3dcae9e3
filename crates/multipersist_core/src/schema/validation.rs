//! Validation messages and validators.

use crate::entity::Entity;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Message recorded for a missing required attribute.
pub const BLANK: &str = "can't be blank";

/// Message recorded when a unique attribute collides with a stored record.
pub const TAKEN: &str = "has already been taken";

/// A custom validation rule attached to an entity type.
///
/// Validators inspect the instance and append messages; they must not
/// mutate the instance.
pub type Validator = Arc<dyn Fn(&Entity, &mut ValidationErrors) + Send + Sync>;

/// Attribute name to list of failure messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    messages: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Creates an empty error set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message against an attribute.
    pub fn add(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.messages
            .entry(attribute.into())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for `attribute`; empty when there are none.
    pub fn get(&self, attribute: &str) -> &[String] {
        self.messages.get(attribute).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any message was recorded against `attribute`.
    pub fn contains(&self, attribute: &str) -> bool {
        !self.get(attribute).is_empty()
    }

    /// Whether there are no messages at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total number of messages.
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    /// Removes all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Appends every message from `other`.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (attribute, messages) in other.messages {
            self.messages.entry(attribute).or_default().extend(messages);
        }
    }

    /// Iterates `(attribute, messages)` in attribute order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.messages
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attribute, messages) in &self.messages {
            for message in messages {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{attribute} {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}
