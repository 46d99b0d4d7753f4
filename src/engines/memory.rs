//! # In-Process Engine
//!
//! Implements the [`ContainerEngine`] trait entirely in memory. Nothing is
//! built or executed: images are the descriptors read from the build
//! context, and instances are bookkeeping entries with a running flag and a
//! log buffer.
//!
//! Used by the test suite and by `CLOUDLAB_ENGINE=memory` for exercising the
//! HTTP surface on hosts without a container daemon.
//!
//! ## Behavior Mirrored From Real Engines
//!
//! - Instance ids are 64 hex characters; lookups accept the full id, any
//!   unique id prefix, or the instance name.
//! - Instance names are unique; running a second instance under a taken name
//!   fails with a conflict.
//! - Running an image that was never built fails.
//! - Removing a running instance without `force` fails.
//!
//! ## Fault Injection
//!
//! Builds, runs, and teardown calls can be made to fail with a given message
//! to exercise the error paths of the lifecycle. Builds and runs can also be
//! slowed down to widen race windows.
//!
//! [`ContainerEngine`]: crate::engine::ContainerEngine

use crate::constants::DESCRIPTOR_FILE_NAME;
use crate::engine::{ContainerEngine, InstanceHandle, MemoryLimit, RunSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Snapshot of an in-memory instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryInstance {
    pub id: String,
    pub name: String,
    pub image_tag: String,
    pub port: u16,
    pub mem_limit: Option<MemoryLimit>,
    pub running: bool,
    pub logs: Vec<u8>,
}

#[derive(Default)]
struct EngineState {
    /// Built images: tag → descriptor text.
    images: HashMap<String, String>,
    /// Instances by full id.
    instances: HashMap<String, MemoryInstance>,
    /// Names held by instances this engine did not start.
    foreign_names: Vec<String>,
    next_seq: u64,
    build_failure: Option<String>,
    run_failure: Option<String>,
    teardown_failure: Option<String>,
    /// Delay applied to every build and run.
    latency: Duration,
    build_count: usize,
}

impl EngineState {
    fn resolve(&self, id_or_name: &str) -> Option<String> {
        if id_or_name.is_empty() {
            return None;
        }
        if self.instances.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        if let Some(instance) = self.instances.values().find(|i| i.name == id_or_name) {
            return Some(instance.id.clone());
        }

        let mut prefixed = self
            .instances
            .keys()
            .filter(|id| id.starts_with(id_or_name));
        match (prefixed.next(), prefixed.next()) {
            (Some(id), None) => Some(id.clone()),
            _ => None,
        }
    }
}

/// In-memory engine backend.
#[derive(Default)]
pub struct MemoryEngine {
    state: RwLock<EngineState>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, EngineState>> {
        self.state
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, EngineState>> {
        self.state
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
    }

    // =========================================================================
    // Fault Injection
    // =========================================================================

    /// Makes every following build fail with `message`.
    pub fn fail_builds_with(&self, message: impl Into<String>) -> Result<()> {
        self.write()?.build_failure = Some(message.into());
        Ok(())
    }

    /// Makes every following run fail with `message`.
    pub fn fail_runs_with(&self, message: impl Into<String>) -> Result<()> {
        self.write()?.run_failure = Some(message.into());
        Ok(())
    }

    /// Makes every following stop, remove, and logs call fail with `message`.
    pub fn fail_teardown_with(&self, message: impl Into<String>) -> Result<()> {
        self.write()?.teardown_failure = Some(message.into());
        Ok(())
    }

    /// Delays every following build and run by `latency`.
    pub fn set_latency(&self, latency: Duration) -> Result<()> {
        self.write()?.latency = latency;
        Ok(())
    }

    async fn simulate_latency(&self) -> Result<()> {
        let latency = self.read()?.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) -> Result<()> {
        let mut state = self.write()?;
        state.build_failure = None;
        state.run_failure = None;
        state.teardown_failure = None;
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Occupies `name` in the engine namespace without an instance of ours.
    pub fn reserve_foreign_name(&self, name: impl Into<String>) -> Result<()> {
        self.write()?.foreign_names.push(name.into());
        Ok(())
    }

    /// Appends raw bytes to an instance's log buffer.
    pub fn append_logs(&self, id_or_name: &str, bytes: &[u8]) -> Result<()> {
        let mut state = self.write()?;
        let id = state
            .resolve(id_or_name)
            .ok_or_else(|| Error::InstanceNotFound(id_or_name.to_string()))?;
        if let Some(instance) = state.instances.get_mut(&id) {
            instance.logs.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Returns a snapshot of an instance.
    pub fn instance(&self, id_or_name: &str) -> Result<Option<MemoryInstance>> {
        let state = self.read()?;
        Ok(state
            .resolve(id_or_name)
            .and_then(|id| state.instances.get(&id).cloned()))
    }

    /// Returns the descriptor an image was built from.
    pub fn image_descriptor(&self, tag: &str) -> Result<Option<String>> {
        Ok(self.read()?.images.get(tag).cloned())
    }

    /// Returns the number of instances, running or not.
    pub fn instance_count(&self) -> Result<usize> {
        Ok(self.read()?.instances.len())
    }

    /// Returns the number of builds attempted.
    pub fn build_count(&self) -> Result<usize> {
        Ok(self.read()?.build_count)
    }
}

#[async_trait]
impl ContainerEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn build_image(&self, context: &Path, tag: &str) -> Result<()> {
        self.simulate_latency().await?;
        let descriptor = tokio::fs::read_to_string(context.join(DESCRIPTOR_FILE_NAME))
            .await
            .map_err(|e| Error::engine("build", format!("unable to read descriptor: {}", e)))?;

        let mut state = self.write()?;
        state.build_count += 1;
        if let Some(message) = state.build_failure.clone() {
            return Err(Error::engine("build", message));
        }

        debug!("memory engine built {}", tag);
        state.images.insert(tag.to_string(), descriptor);
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<InstanceHandle> {
        self.simulate_latency().await?;
        let mut state = self.write()?;
        if let Some(message) = state.run_failure.clone() {
            return Err(Error::engine("run", message));
        }
        if !state.images.contains_key(&spec.image_tag) {
            return Err(Error::engine(
                "run",
                format!("No such image: {}", spec.image_tag),
            ));
        }
        let name_taken = state.foreign_names.iter().any(|n| *n == spec.name)
            || state.instances.values().any(|i| i.name == spec.name);
        if name_taken {
            return Err(Error::engine(
                "run",
                format!("Conflict. The container name \"/{}\" is already in use", spec.name),
            ));
        }

        state.next_seq += 1;
        let mut hasher = Sha256::new();
        hasher.update(spec.name.as_bytes());
        hasher.update(state.next_seq.to_le_bytes());
        let id = hex::encode(hasher.finalize());

        state.instances.insert(
            id.clone(),
            MemoryInstance {
                id: id.clone(),
                name: spec.name.clone(),
                image_tag: spec.image_tag.clone(),
                port: spec.port,
                mem_limit: spec.mem_limit,
                running: true,
                logs: Vec::new(),
            },
        );

        Ok(InstanceHandle::new(id))
    }

    async fn stop(&self, id: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.write()?;
        if let Some(message) = state.teardown_failure.clone() {
            return Err(Error::engine("stop", message));
        }
        let id = state
            .resolve(id)
            .ok_or_else(|| Error::InstanceNotFound(id.to_string()))?;
        if let Some(instance) = state.instances.get_mut(&id) {
            instance.running = false;
        }
        Ok(())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.write()?;
        if let Some(message) = state.teardown_failure.clone() {
            return Err(Error::engine("remove", message));
        }
        let full_id = state
            .resolve(id)
            .ok_or_else(|| Error::InstanceNotFound(id.to_string()))?;
        let running = state
            .instances
            .get(&full_id)
            .map(|i| i.running)
            .unwrap_or(false);
        if running && !force {
            return Err(Error::engine(
                "remove",
                format!("cannot remove running container {}", id),
            ));
        }
        state.instances.remove(&full_id);
        Ok(())
    }

    async fn exists(&self, id_or_name: &str) -> Result<bool> {
        let state = self.read()?;
        Ok(state.resolve(id_or_name).is_some()
            || state.foreign_names.iter().any(|n| n == id_or_name))
    }

    async fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let state = self.read()?;
        if let Some(message) = state.teardown_failure.clone() {
            return Err(Error::engine("logs", message));
        }
        let full_id = state
            .resolve(id)
            .ok_or_else(|| Error::InstanceNotFound(id.to_string()))?;
        Ok(state
            .instances
            .get(&full_id)
            .map(|i| i.logs.clone())
            .unwrap_or_default())
    }
}
