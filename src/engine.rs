//! Container engine trait - the port every engine backend implements.
//!
//! This trait defines the engine primitives the lifecycle consumes:
//! - `build_image`: Build an image from a build context directory
//! - `run`: Create and start a named instance from an image
//! - `stop`: Gracefully stop an instance
//! - `remove`: Remove an instance, optionally by force
//! - `exists`: Check whether an id, short id, or name resolves
//! - `logs`: Fetch raw log bytes for an instance
//!
//! # Error Contract
//!
//! Implementations return [`Error::InstanceNotFound`] from `stop`, `remove`,
//! and `logs` when the engine has no such instance, and [`Error::Engine`] for
//! every other engine failure. Callers decide which of those to absorb.
//!
//! [`Error::InstanceNotFound`]: crate::error::Error::InstanceNotFound
//! [`Error::Engine`]: crate::error::Error::Engine

use crate::constants::SHORT_ID_LEN;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Memory Limit
// =============================================================================

/// Memory ceiling for an instance, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryLimit(u64);

impl MemoryLimit {
    /// Creates a limit from a byte count. Zero is rejected.
    pub fn from_bytes(bytes: u64) -> Result<Self> {
        if bytes == 0 {
            return Err(Error::validation("ram_limit must be greater than zero"));
        }
        Ok(Self(bytes))
    }

    /// Parses a limit such as `"536870912"`, `"512m"`, `"512MB"`, or `"2g"`.
    ///
    /// Units are binary (`k` = 1024) and case-insensitive; a trailing `b`
    /// after the unit is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let lower = raw.to_ascii_lowercase();
        let mut digits = lower.as_str();

        if digits.len() > 1 && digits.ends_with('b') {
            digits = &digits[..digits.len() - 1];
        }

        let multiplier: u64 = match digits.chars().last() {
            Some('k') => 1024,
            Some('m') => 1024 * 1024,
            Some('g') => 1024 * 1024 * 1024,
            _ => 1,
        };
        if multiplier > 1 {
            digits = &digits[..digits.len() - 1];
        }

        let value: u64 = digits
            .parse()
            .map_err(|_| Error::validation(format!("invalid ram_limit '{}'", raw)))?;
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| Error::validation(format!("ram_limit '{}' is too large", raw)))?;

        Self::from_bytes(bytes)
    }

    /// Returns the limit in bytes.
    pub fn bytes(self) -> u64 {
        self.0
    }
}

// =============================================================================
// Run Spec / Instance Handle
// =============================================================================

/// Everything the engine needs to start an instance.
///
/// There is deliberately no CPU field: CPU shares are never passed to the
/// engine, because some virtualization hosts mishandle CPU-share cgroups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Image tag to run.
    pub image_tag: String,
    /// Instance name in the engine's namespace.
    pub name: String,
    /// Port published on the host and in the container.
    pub port: u16,
    /// Optional memory ceiling.
    pub mem_limit: Option<MemoryLimit>,
}

/// Handle to a started instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// Full engine-assigned id.
    pub id: String,
}

impl InstanceHandle {
    /// Creates a handle from an engine id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the first [`SHORT_ID_LEN`] characters of the id.
    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }
}

// =============================================================================
// Container Engine Trait
// =============================================================================

/// Engine capability injected into every lifecycle component.
///
/// # Implementations
///
/// - `DockerEngine`: Docker Engine API
/// - `MemoryEngine`: In-process engine for tests and dry runs
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Returns the backend name.
    fn name(&self) -> &str;

    /// Builds `tag` from the build context at `context`, discarding
    /// intermediate containers.
    async fn build_image(&self, context: &Path, tag: &str) -> Result<()>;

    /// Creates and starts a detached instance.
    async fn run(&self, spec: &RunSpec) -> Result<InstanceHandle>;

    /// Stops an instance, waiting up to `timeout` before it is killed.
    async fn stop(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Removes an instance. With `force`, a running instance is killed first.
    async fn remove(&self, id: &str, force: bool) -> Result<()>;

    /// Returns true if `id_or_name` resolves to an instance.
    async fn exists(&self, id_or_name: &str) -> Result<bool>;

    /// Returns combined stdout/stderr of an instance.
    async fn logs(&self, id: &str) -> Result<Vec<u8>>;
}
