//! # Lifecycle Manager
//!
//! Orchestrates the lifecycle components behind one owner-scoped API.
//!
//! ## Create
//!
//! ```text
//! validate ──▶ NameAllocator ──▶ ┌──────────────── worker pool ────────────────┐
//!                 (reserve)      │ compile ──▶ build ──▶ run ──▶ registry.insert│
//!                                │                 │ any failure   (running)  │
//!                                │                 ▼                          │
//!                                │          release reservation               │
//!                                └─────────────────────────────────────────────┘
//! ```
//!
//! Validation happens before any engine interaction. A failed build or run
//! releases the name but leaves already-built images in the engine. The
//! registry is settled inside the job, so a caller that stops waiting never
//! leaves an untracked instance or a stale reservation behind.
//!
//! ## Start / Stop / Delete / Logs
//!
//! Each begins with `registry.find(name, owner)`, so a name owned by someone
//! else fails exactly like a missing one.
//!
//! Start, stop, and delete hold a per-name lock from `find` through the
//! engine call to the registry write. Two of them on the same environment
//! run one after the other, never interleaved.

use crate::build::BuildService;
use crate::compiler::ImageSpecCompiler;
use crate::constants::{
    DEFAULT_BASE_IMAGE, DEFAULT_BUILD_WORKERS, DEFAULT_STOP_TIMEOUT, MAX_COMMAND_BLOCK_LEN,
    validate_image_ref,
};
use crate::controller::RuntimeController;
use crate::engine::{ContainerEngine, MemoryLimit, RunSpec};
use crate::error::{Error, Result};
use crate::logs::LogRetriever;
use crate::names::{NameAllocator, base_from_image, sanitize_base};
use crate::pool::WorkerPool;
use crate::registry::LifecycleRegistry;
use crate::state::{Environment, EnvironmentStats, EnvironmentStatus, EnvironmentSummary};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

// =============================================================================
// Settings
// =============================================================================

/// Tunables for a [`LifecycleManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Root directory for build contexts.
    pub build_root: PathBuf,
    /// Maximum concurrent build/run jobs.
    pub build_workers: usize,
    /// Graceful stop timeout handed to the engine.
    pub stop_timeout: Duration,
}

impl ManagerSettings {
    /// Default settings with build contexts under `build_root`.
    pub fn new(build_root: impl Into<PathBuf>) -> Self {
        Self {
            build_root: build_root.into(),
            build_workers: DEFAULT_BUILD_WORKERS,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

// =============================================================================
// Requests and Responses
// =============================================================================

/// A validated-shape create request.
///
/// Port and memory limit are already typed; [`LifecycleManager::create`]
/// checks the remaining fields before touching the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSpec {
    /// Requested name base. Falls back to the image's repository name.
    pub name: Option<String>,
    /// Base image. Blank means [`DEFAULT_BASE_IMAGE`].
    pub image: Option<String>,
    /// Multi-line command block.
    pub commands: Option<String>,
    /// Accepted for compatibility and never applied.
    pub cpu_limit: Option<i64>,
    pub mem_limit: Option<MemoryLimit>,
    pub port: u16,
}

impl EnvironmentSpec {
    /// Keep-alive environment from the default image on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            name: None,
            image: None,
            commands: None,
            cpu_limit: None,
            mem_limit: None,
            port,
        }
    }

    /// Returns the base image to build from.
    pub fn base_image(&self) -> &str {
        match self.image.as_deref().map(str::trim) {
            Some(image) if !image.is_empty() => image,
            _ => DEFAULT_BASE_IMAGE,
        }
    }

    /// Returns the name base for allocation.
    pub fn name_base(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_base(name),
            _ => base_from_image(self.base_image()),
        }
    }

    /// Checks everything not enforced by the field types.
    pub fn validate(&self) -> Result<()> {
        validate_image_ref(self.base_image()).map_err(Error::validation)?;
        if let Some(commands) = &self.commands {
            if commands.len() > MAX_COMMAND_BLOCK_LEN {
                return Err(Error::validation(format!(
                    "commands exceed {} bytes",
                    MAX_COMMAND_BLOCK_LEN
                )));
            }
        }
        if self.port == 0 {
            return Err(Error::validation("port must be between 1 and 65535"));
        }
        Ok(())
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedEnvironment {
    pub name: String,
    pub port: u16,
    pub engine_id: String,
}

// =============================================================================
// Lifecycle Manager
// =============================================================================

/// Owner-scoped environment lifecycle over a single engine.
pub struct LifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<LifecycleRegistry>,
    allocator: NameAllocator,
    compiler: Arc<ImageSpecCompiler>,
    builder: Arc<BuildService>,
    controller: Arc<RuntimeController>,
    logs: LogRetriever,
    pool: WorkerPool,
    /// Per-name locks serializing start, stop, and delete.
    name_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LifecycleManager {
    /// Wires the components around `engine`.
    ///
    /// # Errors
    ///
    /// Fails if the build root cannot be created.
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: ManagerSettings) -> Result<Self> {
        let registry = Arc::new(LifecycleRegistry::new());
        let compiler = ImageSpecCompiler::new(settings.build_root)?;

        info!(
            "lifecycle manager on {} engine, {} build workers",
            engine.name(),
            settings.build_workers.max(1)
        );

        Ok(Self {
            allocator: NameAllocator::new(Arc::clone(&engine), Arc::clone(&registry)),
            compiler: Arc::new(compiler),
            builder: Arc::new(BuildService::new(Arc::clone(&engine))),
            controller: Arc::new(RuntimeController::new(
                Arc::clone(&engine),
                settings.stop_timeout,
            )),
            logs: LogRetriever::new(Arc::clone(&engine)),
            pool: WorkerPool::new(settings.build_workers),
            name_locks: Mutex::new(HashMap::new()),
            registry,
            engine,
        })
    }

    /// Waits for exclusive use of `name`.
    async fn lock_name(&self, name: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .name_locks
                .lock()
                .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        Ok(lock.lock_owned().await)
    }

    fn forget_name_lock(&self, name: &str) -> Result<()> {
        self.name_locks
            .lock()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?
            .remove(name);
        Ok(())
    }

    /// Returns the engine backend name.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Returns the underlying registry.
    pub fn registry(&self) -> &LifecycleRegistry {
        &self.registry
    }

    /// Creates, builds, and runs a new environment for `owner`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] before any engine call
    /// - [`Error::CompileFailed`], [`Error::BuildFailed`], [`Error::RunFailed`]
    pub async fn create(&self, owner: &str, spec: EnvironmentSpec) -> Result<CreatedEnvironment> {
        spec.validate()?;

        let name = self.allocator.allocate(&spec.name_base()).await?;

        let job = CreateJob {
            compiler: Arc::clone(&self.compiler),
            builder: Arc::clone(&self.builder),
            controller: Arc::clone(&self.controller),
            registry: Arc::clone(&self.registry),
            owner: owner.to_string(),
            name: name.clone(),
            spec,
        };

        let result = self.pool.run(job.execute()).await;
        if let Err(Error::WorkerPool(_)) = &result {
            // The job never ran to completion and could not release the name.
            self.registry.release(&name)?;
        }
        result
    }

    /// Lists the owner's environments in creation order.
    pub fn list(&self, owner: &str) -> Result<Vec<EnvironmentSummary>> {
        Ok(self
            .registry
            .list(owner)?
            .iter()
            .map(Environment::summary)
            .collect())
    }

    /// Returns dashboard counters for the owner.
    pub fn stats(&self, owner: &str) -> Result<EnvironmentStats> {
        self.registry.stats(owner)
    }

    /// Starts an exited environment from its stored image.
    ///
    /// A running environment is returned unchanged. Otherwise the previous
    /// instance is force-removed and a fresh one replaces it.
    pub async fn start(&self, name: &str, owner: &str) -> Result<EnvironmentSummary> {
        let guard = self.lock_name(name).await?;
        let record = self.registry.find(name, owner)?;
        if record.is_running() {
            return Ok(record.summary());
        }

        self.controller.remove(&record.engine_id, true).await;

        let run = RunSpec {
            image_tag: record.image_tag.clone(),
            name: record.logical_name.clone(),
            port: record.port,
            mem_limit: record.mem_limit,
        };
        let controller = Arc::clone(&self.controller);
        let registry = Arc::clone(&self.registry);
        let (name, owner) = (name.to_string(), owner.to_string());

        self.pool
            .run(async move {
                let _guard = guard;
                let engine_id = controller.run(&run, None).await?;

                let updated = registry.update(
                    &name,
                    &owner,
                    EnvironmentStatus::Running,
                    Some(engine_id.clone()),
                );
                match updated {
                    Ok(updated) => {
                        info!("started {} as {}", name, engine_id);
                        Ok(updated.summary())
                    }
                    Err(e) => {
                        warn!("discarding instance {} for {}: {}", engine_id, name, e);
                        controller.remove(&engine_id, true).await;
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Stops an environment. Stopping an exited environment succeeds.
    pub async fn stop(&self, name: &str, owner: &str) -> Result<EnvironmentSummary> {
        let _guard = self.lock_name(name).await?;
        let record = self.registry.find(name, owner)?;
        self.controller.stop(&record.engine_id).await;

        let updated = self
            .registry
            .update(name, owner, EnvironmentStatus::Exited, None)?;
        info!("stopped {}", name);
        Ok(updated.summary())
    }

    /// Force-removes the instance and deletes the record.
    ///
    /// The built image and build context are kept.
    pub async fn delete(&self, name: &str, owner: &str) -> Result<()> {
        let _guard = self.lock_name(name).await?;
        let record = self.registry.find(name, owner)?;
        self.controller.remove(&record.engine_id, true).await;
        self.registry.delete(name, owner)?;
        self.forget_name_lock(name)?;

        info!("deleted {}", name);
        Ok(())
    }

    /// Returns the environment's logs as text.
    pub async fn logs(&self, name: &str, owner: &str) -> Result<String> {
        let record = self.registry.find(name, owner)?;
        Ok(self.logs.fetch(&record.engine_id).await)
    }
}

// =============================================================================
// Create Job
// =============================================================================

/// A create whose name is already reserved, run on a pool worker.
struct CreateJob {
    compiler: Arc<ImageSpecCompiler>,
    builder: Arc<BuildService>,
    controller: Arc<RuntimeController>,
    registry: Arc<LifecycleRegistry>,
    owner: String,
    name: String,
    spec: EnvironmentSpec,
}

impl CreateJob {
    /// Provisions the environment, then records it or releases its name.
    async fn execute(self) -> Result<CreatedEnvironment> {
        match self.provision().await {
            Ok((image_tag, engine_id)) => self.register(image_tag, engine_id),
            Err(e) => {
                self.registry.release(&self.name)?;
                Err(e)
            }
        }
    }

    /// Compiles, builds, and runs. Returns the image tag and engine id.
    async fn provision(&self) -> Result<(String, String)> {
        let compiled = self.compiler.compile(
            &self.name,
            self.spec.base_image(),
            self.spec.commands.as_deref(),
        )?;
        self.builder.build(&compiled).await?;

        let run = RunSpec {
            image_tag: compiled.image_tag.clone(),
            name: self.name.clone(),
            port: self.spec.port,
            mem_limit: self.spec.mem_limit,
        };
        let engine_id = self.controller.run(&run, self.spec.cpu_limit).await?;
        Ok((compiled.image_tag, engine_id))
    }

    fn register(self, image_tag: String, engine_id: String) -> Result<CreatedEnvironment> {
        let base_image = self.spec.base_image().to_string();
        self.registry.insert(Environment {
            logical_name: self.name.clone(),
            engine_id: engine_id.clone(),
            image_tag,
            base_image,
            status: EnvironmentStatus::Running,
            owner: self.owner.clone(),
            port: self.spec.port,
            mem_limit: self.spec.mem_limit,
            created_at: Utc::now(),
        })?;

        info!("created {} for {} on port {}", self.name, self.owner, self.spec.port);
        Ok(CreatedEnvironment {
            name: self.name,
            port: self.spec.port,
            engine_id,
        })
    }
}
