//! Environment state types.
//!
//! This module defines the records tracked by the registry:
//! - `EnvironmentStatus`: Lifecycle status and its transitions
//! - `Environment`: The full record owned by the registry
//! - `EnvironmentSummary`: The caller-visible projection used for listing

use crate::engine::MemoryLimit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Environment Status
// =============================================================================

/// Lifecycle status of an environment.
///
/// ```text
///   Pending ──create──▶ Running ◀──start── Exited
///                          │                  ▲
///                          └──────stop────────┘
///
///   any status ──delete──▶ (record removed)
/// ```
///
/// `Pending` only exists while a create is building and running; records
/// enter the registry as `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// Build or run in progress.
    Pending,
    /// Engine instance is running.
    Running,
    /// Engine instance was stopped.
    Exited,
}

impl EnvironmentStatus {
    /// Returns true if moving from `self` to `next` is a lifecycle transition.
    ///
    /// Staying in `Exited` is allowed so that stop stays idempotent.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Exited)
                | (Self::Exited, Self::Running)
                | (Self::Exited, Self::Exited)
        )
    }
}

impl std::fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
        }
    }
}

// =============================================================================
// Environment Record
// =============================================================================

/// A named environment tracked by the registry.
///
/// The registry owns the record; the engine owns the instance behind
/// `engine_id`. `owner` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Caller-visible unique name.
    pub logical_name: String,
    /// Short engine id of the current instance.
    pub engine_id: String,
    /// Tag of the image the instance runs.
    pub image_tag: String,
    /// Base image the descriptor was compiled from.
    pub base_image: String,
    /// Current lifecycle status.
    pub status: EnvironmentStatus,
    /// Owner identity resolved by the auth collaborator.
    pub owner: String,
    /// Host port, bound to the same container port.
    pub port: u16,
    /// Memory limit passed to the engine on every run.
    pub mem_limit: Option<MemoryLimit>,
    /// When the record entered the registry.
    pub created_at: DateTime<Utc>,
}

impl Environment {
    /// Returns true if the environment's instance is running.
    pub fn is_running(&self) -> bool {
        self.status == EnvironmentStatus::Running
    }

    /// Returns the caller-visible projection of this record.
    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            name: self.logical_name.clone(),
            engine_id: self.engine_id.clone(),
            image_tag: self.image_tag.clone(),
            status: self.status,
            owner: self.owner.clone(),
            port: self.port,
        }
    }
}

// =============================================================================
// Environment Summary
// =============================================================================

/// Listing entry returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub name: String,
    pub engine_id: String,
    pub image_tag: String,
    pub status: EnvironmentStatus,
    pub owner: String,
    pub port: u16,
}

/// Per-owner counters for the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentStats {
    pub total_labs: usize,
    pub running_containers: usize,
}
