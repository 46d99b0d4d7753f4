//! Unique environment name allocation.
//!
//! Names are `<base>-<n>` with `n` probed upward from 1. A candidate is
//! accepted only if neither the engine's namespace nor the registry knows it,
//! and acceptance is an atomic reservation in the registry
//! ([`LifecycleRegistry::try_reserve`]). If another create reserves the same
//! candidate between the engine probe and the reservation, probing just
//! moves on to the next index.

use crate::constants::{DEFAULT_NAME_BASE, ENVIRONMENT_NAME_VALID_CHARS, MAX_NAME_BASE_LEN};
use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::registry::LifecycleRegistry;
use std::sync::Arc;
use tracing::{debug, info};

/// Allocates names unique across the engine and the registry.
pub struct NameAllocator {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<LifecycleRegistry>,
}

impl NameAllocator {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: Arc<LifecycleRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Reserves and returns the first free `<base>-<n>`.
    ///
    /// The caller owns the reservation: it must either insert a record under
    /// the returned name or [`release`](LifecycleRegistry::release) it.
    pub async fn allocate(&self, base: &str) -> Result<String> {
        let base = sanitize_base(base);
        let mut index: u64 = 1;

        loop {
            let candidate = format!("{}-{}", base, index);
            index += 1;

            if self.registry.is_name_taken(&candidate)? {
                continue;
            }
            if self.engine.exists(&candidate).await? {
                debug!("name {} is taken in the engine namespace", candidate);
                continue;
            }
            if self.registry.try_reserve(&candidate)? {
                info!("allocated environment name {}", candidate);
                return Ok(candidate);
            }
        }
    }
}

/// Folds a requested base into something an engine accepts as a name.
///
/// The result is lower case, so two names never differ only by case and
/// every name maps to its own image tag. Characters outside
/// `[A-Za-z0-9_.-]` become `-`, separator runs collapse to their first
/// character, separators are dropped at both ends, and the result is capped
/// in length. An empty result falls back to `env`.
pub fn sanitize_base(raw: &str) -> String {
    let mut folded = String::with_capacity(raw.len().min(MAX_NAME_BASE_LEN));
    let mut after_alphanumeric = false;

    for c in raw.trim().chars() {
        let c = if ENVIRONMENT_NAME_VALID_CHARS.contains(c) {
            c.to_ascii_lowercase()
        } else {
            '-'
        };
        if c.is_ascii_alphanumeric() {
            folded.push(c);
            after_alphanumeric = true;
        } else if after_alphanumeric {
            folded.push(c);
            after_alphanumeric = false;
        }
    }

    folded.truncate(MAX_NAME_BASE_LEN);
    let folded = folded.trim_end_matches(|c: char| !c.is_ascii_alphanumeric());

    if folded.is_empty() {
        DEFAULT_NAME_BASE.to_string()
    } else {
        folded.to_string()
    }
}

/// Derives an allocation base from an image reference.
///
/// `ghcr.io/org/app:1.2@sha256:…` → `app`.
pub fn base_from_image(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let repository = without_digest.rsplit('/').next().unwrap_or(without_digest);
    let name = repository.split(':').next().unwrap_or(repository);
    sanitize_base(name)
}
