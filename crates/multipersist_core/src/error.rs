//! Error types for Multipersist core.

use crate::schema::{Phase, ValidationErrors};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed error produced by a concrete backend.
pub type BackendSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in Multipersist core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The type cannot be bound to a backend because it does not carry a
    /// usable entity schema.
    #[error("invalid entity type {name}: {reason}")]
    InvalidEntityType {
        /// Name of the offending type.
        name: String,
        /// Why the type was refused.
        reason: String,
    },

    /// A second primary key was declared on one entity type.
    #[error("entity type {entity} declares two primary keys: {first} and {second}")]
    DuplicatePrimaryKey {
        /// Entity type name.
        entity: String,
        /// The primary key declared first.
        first: String,
        /// The primary key declared second.
        second: String,
    },

    /// An attribute name was declared twice on one entity type.
    #[error("entity type {entity} declares attribute {attribute} twice")]
    DuplicateAttribute {
        /// Entity type name.
        entity: String,
        /// Duplicated attribute.
        attribute: String,
    },

    /// A primary-key operation was attempted on a type without a primary key.
    #[error("no primary key defined for {entity}")]
    NoPrimaryKey {
        /// Entity type name.
        entity: String,
    },

    /// An attribute name is not part of the entity schema.
    #[error("unknown attribute {attribute} for {entity}")]
    UnknownAttribute {
        /// Entity type name.
        entity: String,
        /// The unknown attribute.
        attribute: String,
    },

    /// Strict save refused an instance that failed validation.
    #[error("validation failed for {entity}: {errors}")]
    ValidationFailed {
        /// Entity type name.
        entity: String,
        /// The validation messages.
        errors: ValidationErrors,
    },

    /// The backend rejected the record during a strict save
    /// (uniqueness or another constraint).
    #[error("record invalid for {entity}: {errors}")]
    RecordInvalid {
        /// Entity type name.
        entity: String,
        /// Constraint messages reported by the backend.
        errors: ValidationErrors,
    },

    /// A condition document used an operator the translator does not know.
    #[error("unsupported operator {operator:?} on field {field}")]
    UnsupportedOperator {
        /// Field the operator was applied to.
        field: String,
        /// The operator as written.
        operator: String,
    },

    /// A condition document is structurally malformed.
    #[error("invalid condition: {message}")]
    InvalidCondition {
        /// Description of the problem.
        message: String,
    },

    /// An ordering direction other than 1 / -1 was supplied.
    #[error("invalid ordering direction {direction} for field {field}")]
    InvalidOrdering {
        /// The field being ordered.
        field: String,
        /// The direction as supplied.
        direction: i64,
    },

    /// A persistence operation was attempted on an unconnected entity type.
    #[error("{entity} is trying to access a persistence operation without a backend connection")]
    NotConnected {
        /// Entity type name.
        entity: String,
    },

    /// An around-hook did not proceed, so the strict operation did not run.
    #[error("{phase} of {entity} was halted by a lifecycle hook")]
    Halted {
        /// Entity type name.
        entity: String,
        /// Lifecycle phase that was halted.
        phase: Phase,
    },

    /// The instance was already destroyed.
    #[error("{entity} has been destroyed")]
    Destroyed {
        /// Entity type name.
        entity: String,
    },

    /// A concrete backend failed; propagated unchanged.
    #[error("backend error: {0}")]
    Backend(#[source] BackendSource),
}

impl CoreError {
    /// Creates an invalid entity type error.
    pub fn invalid_entity_type(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntityType {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a no primary key error.
    pub fn no_primary_key(entity: impl Into<String>) -> Self {
        Self::NoPrimaryKey {
            entity: entity.into(),
        }
    }

    /// Creates an unknown attribute error.
    pub fn unknown_attribute(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates an unsupported operator error.
    pub fn unsupported_operator(field: impl Into<String>, operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            field: field.into(),
            operator: operator.into(),
        }
    }

    /// Creates an invalid condition error.
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition {
            message: message.into(),
        }
    }

    /// Creates a not connected error.
    pub fn not_connected(entity: impl Into<String>) -> Self {
        Self::NotConnected {
            entity: entity.into(),
        }
    }

    /// Wraps a backend failure.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BackendSource>,
    {
        Self::Backend(err.into())
    }

    /// Returns the validation messages carried by this error, if any.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::ValidationFailed { errors, .. } | Self::RecordInvalid { errors, .. } => {
                Some(errors)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = CoreError::backend(io);
        assert_eq!(err.to_string(), "backend error: disk full");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn validation_errors_are_exposed() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "can't be blank");
        let err = CoreError::ValidationFailed {
            entity: "Person".into(),
            errors,
        };
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.get("email"), ["can't be blank"]);
        assert!(CoreError::no_primary_key("Item").validation_errors().is_none());
    }
}
