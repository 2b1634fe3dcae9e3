//! Entity instances and their lifecycle.

mod instance;
mod lifecycle;

pub use instance::{AttributeChange, Entity, LifecycleState};
