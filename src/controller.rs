//! # Runtime Controller
//!
//! Starts, stops, and removes engine instances.
//!
//! ## Resource Constraints
//!
//! - Exactly one port is published, host port = container port.
//! - A memory limit is forwarded unchanged.
//! - CPU limits are never forwarded. Some virtualization hosts mishandle
//!   CPU-share cgroups, so any caller-supplied value is logged and dropped.
//!
//! ## Teardown Policy
//!
//! `stop` and `remove` never fail from the caller's point of view. The
//! outcome is still reported as a [`Teardown`] value so that "already gone"
//! is distinguishable from an engine error that was absorbed; the latter is
//! logged at WARN.

use crate::build::engine_message;
use crate::engine::{ContainerEngine, RunSpec};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a stop or remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// The engine performed the operation.
    Completed,
    /// The engine had no such instance.
    AlreadyGone,
    /// The engine failed; the failure was logged and treated as success.
    Absorbed { reason: String },
}

impl Teardown {
    fn from_result(operation: &str, id: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(Error::InstanceNotFound(_)) => {
                debug!("{} {}: instance already gone", operation, id);
                Self::AlreadyGone
            }
            Err(e) => {
                let reason = engine_message(e);
                warn!("{} {} failed, continuing: {}", operation, id, reason);
                Self::Absorbed { reason }
            }
        }
    }
}

/// Runs and tears down engine instances.
pub struct RuntimeController {
    engine: Arc<dyn ContainerEngine>,
    stop_timeout: Duration,
}

impl RuntimeController {
    pub fn new(engine: Arc<dyn ContainerEngine>, stop_timeout: Duration) -> Self {
        Self {
            engine,
            stop_timeout,
        }
    }

    /// Runs `spec` and returns the engine id to record.
    ///
    /// The 12-character short id is returned when the engine resolves it;
    /// otherwise the full id is kept.
    ///
    /// # Errors
    ///
    /// [`Error::RunFailed`] with the engine's message. A previously built
    /// image is left in place.
    pub async fn run(&self, spec: &RunSpec, cpu_limit: Option<i64>) -> Result<String> {
        if let Some(cpu) = cpu_limit {
            debug!("ignoring cpu_limit {} for {}: CPU limits are disabled", cpu, spec.name);
        }

        let handle = self.engine.run(spec).await.map_err(|e| {
            let reason = engine_message(e);
            warn!("run of {} failed: {}", spec.name, reason);
            Error::RunFailed {
                name: spec.name.clone(),
                reason,
            }
        })?;

        let short = handle.short_id();
        let engine_id = match self.engine.exists(short).await {
            Ok(true) => short.to_string(),
            Ok(false) => {
                warn!("short id {} does not resolve, keeping full id", short);
                handle.id.clone()
            }
            Err(e) => {
                warn!("cannot verify short id {}: {}", short, e);
                handle.id.clone()
            }
        };

        info!(
            "started {} as {} on port {}",
            spec.name, engine_id, spec.port
        );
        Ok(engine_id)
    }

    /// Gracefully stops an instance.
    pub async fn stop(&self, engine_id: &str) -> Teardown {
        let result = self.engine.stop(engine_id, self.stop_timeout).await;
        Teardown::from_result("stop", engine_id, result)
    }

    /// Removes an instance.
    pub async fn remove(&self, engine_id: &str, force: bool) -> Teardown {
        let result = self.engine.remove(engine_id, force).await;
        Teardown::from_result("remove", engine_id, result)
    }
}
