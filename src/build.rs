//! Image builds over a compiled build context.

use crate::compiler::CompiledSpec;
use crate::engine::ContainerEngine;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives the engine's build primitive.
///
/// Builds are never retried. Any engine failure becomes
/// [`Error::BuildFailed`] carrying the engine's message unchanged.
pub struct BuildService {
    engine: Arc<dyn ContainerEngine>,
}

impl BuildService {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Builds `spec.image_tag` from `spec.context_dir`.
    pub async fn build(&self, spec: &CompiledSpec) -> Result<()> {
        info!("building {} for {}", spec.image_tag, spec.name);

        match self
            .engine
            .build_image(&spec.context_dir, &spec.image_tag)
            .await
        {
            Ok(()) => {
                info!("built {}", spec.image_tag);
                Ok(())
            }
            Err(e) => {
                let reason = engine_message(e);
                warn!("build of {} failed: {}", spec.image_tag, reason);
                Err(Error::BuildFailed {
                    tag: spec.image_tag.clone(),
                    reason,
                })
            }
        }
    }
}

/// Extracts the engine's own message from an error.
pub(crate) fn engine_message(error: Error) -> String {
    match error {
        Error::Engine { reason, .. } => reason,
        other => other.to_string(),
    }
}
