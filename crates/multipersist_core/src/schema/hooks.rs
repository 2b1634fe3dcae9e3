//! Lifecycle hook chains.
//!
//! Each lifecycle phase owns three ordered lists: before-hooks, around-hooks
//! and after-hooks. They run in this fixed order:
//!
//! 1. before-hooks, in declaration order
//! 2. around-hooks, nested: the first declared is the outermost; each one
//!    decides whether to [`Proceed::run`] the rest of the chain
//! 3. the persistence operation itself, innermost
//! 4. after-hooks, in declaration order
//!
//! An around-hook that never proceeds vetoes the operation: the backend is
//! not called and after-hooks do not run.

use crate::entity::Entity;
use crate::error::CoreResult;
use std::fmt;
use std::sync::Arc;

/// Lifecycle phase a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Inserting a new record.
    Create,
    /// Updating a persisted record.
    Update,
    /// Destroying a persisted record.
    Destroy,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Create => "create",
            Phase::Update => "update",
            Phase::Destroy => "destroy",
        })
    }
}

/// A before- or after-hook.
pub type Hook = Arc<dyn Fn(&mut Entity) -> CoreResult<()> + Send + Sync>;

/// An around-hook. It receives the continuation for the rest of the chain.
pub type AroundHook = Arc<dyn Fn(&mut Entity, Proceed<'_>) -> CoreResult<()> + Send + Sync>;

/// Continuation handed to an around-hook.
///
/// Consumed by [`Proceed::run`], so the wrapped operation runs at most once
/// per hook invocation.
pub struct Proceed<'a> {
    next: &'a mut dyn FnMut(&mut Entity) -> CoreResult<()>,
}

impl<'a> Proceed<'a> {
    /// Runs the remaining around-hooks and the persistence operation.
    pub fn run(self, entity: &mut Entity) -> CoreResult<()> {
        (self.next)(entity)
    }
}

/// Hooks registered for one phase.
#[derive(Clone, Default)]
pub struct PhaseHooks {
    pub(crate) before: Vec<Hook>,
    pub(crate) around: Vec<AroundHook>,
    pub(crate) after: Vec<Hook>,
}

impl PhaseHooks {
    /// Whether no hook of any kind is registered.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.around.is_empty() && self.after.is_empty()
    }

    /// Runs the whole chain around `operation`.
    ///
    /// `operation` returns `false` when the backend refused the write.
    /// Returns `Ok(false)` when an around-hook vetoed the operation or the
    /// operation itself reported a refusal; after-hooks run only on
    /// `Ok(true)`.
    pub(crate) fn run(
        &self,
        entity: &mut Entity,
        operation: &mut dyn FnMut(&mut Entity) -> CoreResult<bool>,
    ) -> CoreResult<bool> {
        for hook in &self.before {
            hook(entity)?;
        }

        let mut completed = false;
        {
            let mut innermost = |e: &mut Entity| -> CoreResult<()> {
                completed = operation(e)?;
                Ok(())
            };
            run_around(&self.around, entity, &mut innermost)?;
        }
        if !completed {
            return Ok(false);
        }

        for hook in &self.after {
            hook(entity)?;
        }
        Ok(true)
    }
}

impl fmt::Debug for PhaseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseHooks")
            .field("before", &self.before.len())
            .field("around", &self.around.len())
            .field("after", &self.after.len())
            .finish()
    }
}

fn run_around(
    hooks: &[AroundHook],
    entity: &mut Entity,
    inner: &mut dyn FnMut(&mut Entity) -> CoreResult<()>,
) -> CoreResult<()> {
    match hooks.split_first() {
        None => inner(entity),
        Some((outer, rest)) => {
            let mut next = |e: &mut Entity| run_around(rest, e, &mut *inner);
            outer(entity, Proceed { next: &mut next })
        }
    }
}

/// Hooks for every phase of an entity type.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    create: PhaseHooks,
    update: PhaseHooks,
    destroy: PhaseHooks,
}

impl Hooks {
    /// Hooks for `phase`.
    pub fn phase(&self, phase: Phase) -> &PhaseHooks {
        match phase {
            Phase::Create => &self.create,
            Phase::Update => &self.update,
            Phase::Destroy => &self.destroy,
        }
    }

    pub(crate) fn phase_mut(&mut self, phase: Phase) -> &mut PhaseHooks {
        match phase {
            Phase::Create => &mut self.create,
            Phase::Update => &mut self.update,
            Phase::Destroy => &mut self.destroy,
        }
    }
}
