//! Entity type declarations: attributes, validation and lifecycle hooks.

mod attribute;
mod entity_type;
mod hooks;
mod validation;

pub use attribute::{Attribute, AttributeType};
pub use entity_type::{EntityType, EntityTypeBuilder, EntityTypeId, CREATED_AT, UPDATED_AT};
pub use hooks::{AroundHook, Hook, Hooks, Phase, PhaseHooks, Proceed};
pub use validation::{ValidationErrors, Validator, BLANK, TAKEN};
