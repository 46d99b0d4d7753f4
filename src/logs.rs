//! Log retrieval that never fails.

use crate::constants::{LOGS_NOT_FOUND_TEXT, LOGS_UNAVAILABLE_TEXT};
use crate::engine::ContainerEngine;
use crate::error::Error;
use std::sync::Arc;
use tracing::warn;

/// Fetches instance logs as text.
pub struct LogRetriever {
    engine: Arc<dyn ContainerEngine>,
}

impl LogRetriever {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Returns the instance's combined output.
    ///
    /// Invalid UTF-8 is replaced, not rejected. A missing instance yields
    /// [`LOGS_NOT_FOUND_TEXT`]; any other engine failure is logged and yields
    /// [`LOGS_UNAVAILABLE_TEXT`].
    pub async fn fetch(&self, engine_id: &str) -> String {
        match self.engine.logs(engine_id).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(Error::InstanceNotFound(_)) => LOGS_NOT_FOUND_TEXT.to_string(),
            Err(e) => {
                warn!("log fetch for {} failed: {}", engine_id, e);
                LOGS_UNAVAILABLE_TEXT.to_string()
            }
        }
    }
}
