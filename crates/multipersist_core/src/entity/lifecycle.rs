//! Save and destroy: the entity lifecycle engine.
//!
//! ```text
//!            save (create)            set
//!   New ─────────────────► Persisted ─────► Dirty
//!                            ▲   │            │
//!                            │   │ destroy    │ save (update)
//!                            │   ▼            │
//!                            │ Destroyed ◄────┤ destroy
//!                            └────────────────┘
//! ```
//!
//! Every save first validates. An invalid instance never reaches a hook or
//! the backend. A valid instance without changes is already saved and the
//! backend is not contacted.

use crate::backend::WriteOutcome;
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::schema::Phase;
use tracing::{debug, trace};

/// Result of one attempted save.
#[derive(Debug)]
enum SaveStatus {
    Saved,
    Unchanged,
    Invalid,
    Rejected,
    Halted(Phase),
}

impl Entity {
    /// Saves the instance through its connected backend.
    ///
    /// Returns `Ok(false)` when validation fails or the backend rejects the
    /// record; [`Entity::errors`] then holds the reasons. Returns `Ok(true)`
    /// without contacting the backend when nothing changed. An around-hook
    /// that does not proceed also yields `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the instance came from a bare entity type
    /// - `Destroyed` if the instance was destroyed
    /// - `Backend` for storage failures, and any error a hook returns
    pub fn save(&mut self) -> CoreResult<bool> {
        Ok(matches!(self.persist()?, SaveStatus::Saved | SaveStatus::Unchanged))
    }

    /// Like [`Entity::save`] but every refusal is an error.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`Entity::save`]:
    /// - `ValidationFailed` when validation fails
    /// - `RecordInvalid` when the backend rejects the record
    /// - `Halted` when an around-hook vetoes the write
    pub fn save_strict(&mut self) -> CoreResult<()> {
        let entity = self.entity_type().name().to_string();
        match self.persist()? {
            SaveStatus::Saved | SaveStatus::Unchanged => Ok(()),
            SaveStatus::Invalid => Err(CoreError::ValidationFailed {
                entity,
                errors: self.errors.clone(),
            }),
            SaveStatus::Rejected => Err(CoreError::RecordInvalid {
                entity,
                errors: self.errors.clone(),
            }),
            SaveStatus::Halted(phase) => Err(CoreError::Halted { entity, phase }),
        }
    }

    fn persist(&mut self) -> CoreResult<SaveStatus> {
        if self.destroyed {
            return Err(CoreError::Destroyed {
                entity: self.entity_type().name().to_string(),
            });
        }
        let connected = self
            .connected_type()
            .cloned()
            .ok_or_else(|| CoreError::not_connected(self.entity_type().name()))?;

        if !self.validate() {
            trace!(entity = %connected.name(), errors = %self.errors, "save refused by validation");
            return Ok(SaveStatus::Invalid);
        }
        if !self.is_changed() {
            trace!(entity = %connected.name(), "save skipped, nothing changed");
            return Ok(SaveStatus::Unchanged);
        }

        let phase = if self.persisted {
            Phase::Update
        } else {
            Phase::Create
        };
        debug!(entity = %connected.name(), %phase, changed = ?self.changed(), "saving");

        let backend = connected.backend();
        let mut outcome: Option<WriteOutcome> = None;
        connected.entity_type().hooks(phase).run(self, &mut |entity| {
            let result = match phase {
                Phase::Create => backend.create_record(entity, &connected)?,
                _ => backend.update_record(entity, &connected)?,
            };
            let written = result.is_written();
            outcome = Some(result);
            Ok(written)
        })?;

        match outcome {
            Some(WriteOutcome::Written) => {
                self.mark_persisted();
                Ok(SaveStatus::Saved)
            }
            Some(WriteOutcome::Rejected(errors)) => {
                debug!(entity = %connected.name(), %errors, "backend rejected record");
                self.errors.merge(errors);
                Ok(SaveStatus::Rejected)
            }
            None => {
                trace!(entity = %connected.name(), %phase, "save vetoed by around-hook");
                Ok(SaveStatus::Halted(phase))
            }
        }
    }

    /// Destroys the persisted record through its backend.
    ///
    /// Returns `Ok(false)` when the instance was never persisted, is
    /// already destroyed, or an around-hook vetoed the destroy. On success
    /// the instance is no longer persisted and further saves fail.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Backend` failures, and any error a hook returns.
    pub fn destroy(&mut self) -> CoreResult<bool> {
        if !self.persisted || self.destroyed {
            return Ok(false);
        }
        let connected = self
            .connected_type()
            .cloned()
            .ok_or_else(|| CoreError::not_connected(self.entity_type().name()))?;
        debug!(entity = %connected.name(), "destroying");

        let backend = connected.backend();
        let completed = connected
            .entity_type()
            .hooks(Phase::Destroy)
            .run(self, &mut |entity| {
                backend.destroy_record(entity, &connected)?;
                Ok(true)
            })?;

        if completed {
            self.persisted = false;
            self.destroyed = true;
        } else {
            trace!(entity = %connected.name(), "destroy vetoed by around-hook");
        }
        Ok(completed)
    }
}
