//! # Lifecycle Registry
//!
//! Owner-scoped table of environment records. This is the only mutable
//! state shared between requests.
//!
//! ## Ownership Scoping
//!
//! Every read and write takes the caller's owner and matches it exactly. A
//! record owned by someone else is reported exactly like a missing record
//! ([`Error::EnvironmentNotFound`]), so callers cannot probe for names that
//! belong to other owners.
//!
//! ## Name Reservations
//!
//! Besides records, the registry holds *reservations*: names handed out by
//! the [`NameAllocator`](crate::names::NameAllocator) whose create is still
//! building or running. A reserved name counts as taken. [`insert`] turns a
//! reservation into a record; [`release`] drops it after a failed create.
//! Check-and-reserve happens under one write lock, so two concurrent creates
//! can never be handed the same name.
//!
//! ## Durability
//!
//! None. Records live for the lifetime of the process; instances the engine
//! keeps running across a restart are no longer tracked.
//!
//! [`insert`]: LifecycleRegistry::insert
//! [`release`]: LifecycleRegistry::release
//! [`Error::EnvironmentNotFound`]: crate::error::Error::EnvironmentNotFound

use crate::error::{Error, Result};
use crate::state::{Environment, EnvironmentStats, EnvironmentStatus};
use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Default)]
struct RegistryState {
    /// Records in insertion order.
    records: Vec<Environment>,
    /// Names allocated to creates that have not finished yet.
    reserved: HashSet<String>,
}

impl RegistryState {
    fn position(&self, name: &str, owner: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.logical_name == name && r.owner == owner)
    }

    fn name_taken(&self, name: &str) -> bool {
        self.reserved.contains(name) || self.records.iter().any(|r| r.logical_name == name)
    }
}

/// Owner-scoped, in-memory environment table.
///
/// ## Thread Safety
///
/// All state sits behind a single `RwLock`; every mutation takes the write
/// lock for its whole check-then-act sequence.
#[derive(Default)]
pub struct LifecycleRegistry {
    state: RwLock<RegistryState>,
}

impl LifecycleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }

    // =========================================================================
    // Reservations
    // =========================================================================

    /// Atomically reserves `name` if no record or reservation holds it.
    ///
    /// Returns `false` when the name is already taken.
    pub fn try_reserve(&self, name: &str) -> Result<bool> {
        let mut state = self.write()?;
        if state.name_taken(name) {
            return Ok(false);
        }
        state.reserved.insert(name.to_string());
        Ok(true)
    }

    /// Drops a reservation left by a failed create.
    pub fn release(&self, name: &str) -> Result<()> {
        if self.write()?.reserved.remove(name) {
            debug!("released name reservation {}", name);
        }
        Ok(())
    }

    /// Returns true if any record or reservation holds `name`, for any owner.
    pub fn is_name_taken(&self, name: &str) -> Result<bool> {
        Ok(self.read()?.name_taken(name))
    }

    // =========================================================================
    // Owner-Scoped CRUD
    // =========================================================================

    /// Inserts a record, consuming its name reservation.
    ///
    /// Uniqueness is not re-checked here; it is guaranteed by the allocator's
    /// reservation.
    pub fn insert(&self, record: Environment) -> Result<()> {
        let mut state = self.write()?;
        state.reserved.remove(&record.logical_name);
        debug!(
            "registered {} for owner {}",
            record.logical_name, record.owner
        );
        state.records.push(record);
        Ok(())
    }

    /// Returns the owner's records in insertion order.
    pub fn list(&self, owner: &str) -> Result<Vec<Environment>> {
        Ok(self
            .read()?
            .records
            .iter()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect())
    }

    /// Finds the owner's record named `name`.
    pub fn find(&self, name: &str, owner: &str) -> Result<Environment> {
        let state = self.read()?;
        state
            .position(name, owner)
            .map(|idx| state.records[idx].clone())
            .ok_or_else(|| Error::EnvironmentNotFound(name.to_string()))
    }

    /// Moves the owner's record to `status`, optionally replacing its engine id.
    ///
    /// Rejects changes that are not lifecycle transitions.
    pub fn update(
        &self,
        name: &str,
        owner: &str,
        status: EnvironmentStatus,
        engine_id: Option<String>,
    ) -> Result<Environment> {
        let mut state = self.write()?;
        let idx = state
            .position(name, owner)
            .ok_or_else(|| Error::EnvironmentNotFound(name.to_string()))?;

        let record = &mut state.records[idx];
        if record.status != status && !record.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                name: name.to_string(),
                from: record.status.to_string(),
                to: status.to_string(),
            });
        }

        record.status = status;
        if let Some(engine_id) = engine_id {
            record.engine_id = engine_id;
        }
        Ok(record.clone())
    }

    /// Removes the owner's record named `name` and returns it.
    pub fn delete(&self, name: &str, owner: &str) -> Result<Environment> {
        let mut state = self.write()?;
        let idx = state
            .position(name, owner)
            .ok_or_else(|| Error::EnvironmentNotFound(name.to_string()))?;
        Ok(state.records.remove(idx))
    }

    /// Returns dashboard counters for the owner.
    pub fn stats(&self, owner: &str) -> Result<EnvironmentStats> {
        let state = self.read()?;
        let mut stats = EnvironmentStats::default();
        for record in state.records.iter().filter(|r| r.owner == owner) {
            stats.total_labs += 1;
            if record.is_running() {
                stats.running_containers += 1;
            }
        }
        Ok(stats)
    }

    /// Returns the number of records across all owners.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }

    /// Returns true if the registry holds no records.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
