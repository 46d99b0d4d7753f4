//! Container engine backends.
//!
//! Each backend implements [`ContainerEngine`](crate::engine::ContainerEngine)
//! and is selected once at startup.

pub mod docker;
pub mod memory;

pub use self::docker::DockerEngine;
pub use self::memory::{MemoryEngine, MemoryInstance};

use crate::engine::ContainerEngine;
use crate::error::Result;
use std::sync::Arc;

/// Engine backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Docker Engine API on the local daemon.
    Docker,
    /// In-process engine, nothing is executed.
    Memory,
}

impl EngineKind {
    /// Parses a backend name (`docker` or `memory`).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Some(Self::Docker),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }

    /// Opens the selected backend.
    pub fn open(self) -> Result<Arc<dyn ContainerEngine>> {
        match self {
            Self::Docker => Ok(Arc::new(DockerEngine::connect()?)),
            Self::Memory => Ok(Arc::new(MemoryEngine::new())),
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

