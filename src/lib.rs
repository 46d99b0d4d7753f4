//! # cloudlab
//!
//! **Owner-Scoped Container Environment Lifecycle**
//!
//! An authenticated caller names a base image and an optional command block
//! and gets back a running, addressable environment. Later it can start,
//! stop, delete, or read the logs of that environment. Everything runs on a
//! single container engine behind the [`ContainerEngine`] trait.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        HTTP API (axum)                              │
//! │          bearer token ──► TokenVerifier ──► owner                   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                       LifecycleManager                              │
//! │  ┌──────────────┐  ┌────────────────────────────────────────────┐   │
//! │  │ NameAllocator│  │              WorkerPool                    │   │
//! │  │ base-1, -2.. │  │ ImageSpecCompiler → BuildService → run     │   │
//! │  └──────┬───────┘  └────────────────────────────────────────────┘   │
//! │         │ reserve                                                   │
//! │  ┌──────▼──────────────────────┐  ┌──────────────────┐ ┌─────────┐  │
//! │  │     LifecycleRegistry       │  │ RuntimeController│ │   Log   │  │
//! │  │ owner-scoped records, names │  │ stop / remove    │ │Retriever│  │
//! │  └─────────────────────────────┘  └──────────────────┘ └─────────┘  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                     ContainerEngine backends                        │
//! │        ┌──────────────────┐          ┌──────────────────┐           │
//! │        │   DockerEngine   │          │   MemoryEngine   │           │
//! │        │ Engine API (unix)│          │  in-process fake │           │
//! │        └──────────────────┘          └──────────────────┘           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Environment Lifecycle
//!
//! ```text
//!   ┌─────────┐  create   ┌─────────┐   stop    ┌─────────┐
//!   │ Pending │ ────────► │ Running │ ────────► │ Exited  │ ──┐ stop
//!   └─────────┘           └─────────┘ ◄──────── └─────────┘ ◄─┘
//!                              │         start       │
//!                              └──── delete ─────────┴──► (record removed)
//! ```
//!
//! # Guarantees
//!
//! - **Unique names**: allocation probes the engine and the registry, and
//!   reserves atomically, so concurrent creates never share a name.
//! - **Serialized lifecycle**: start, stop, and delete on one environment
//!   never interleave.
//! - **Ownership isolation**: another owner's environment is reported as
//!   not found.
//! - **Idempotent teardown**: stop and remove treat "already gone" as
//!   success; other engine failures are logged and absorbed.
//! - **No CPU limits**: caller-supplied CPU values are ignored.
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudlab::{EnvironmentSpec, LifecycleManager, ManagerSettings};
//! use cloudlab::engines::MemoryEngine;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cloudlab::Result<()> {
//!     let manager = LifecycleManager::new(
//!         Arc::new(MemoryEngine::new()),
//!         ManagerSettings::new("/tmp/cloudlab"),
//!     )?;
//!     let created = manager.create("ada", EnvironmentSpec::new(8080)).await?;
//!     manager.stop(&created.name, "ada").await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod build;
pub mod compiler;
pub mod config;
pub mod constants;
pub mod controller;
pub mod engine;
pub mod engines;
pub mod error;
pub mod logs;
pub mod manager;
pub mod names;
pub mod pool;
pub mod registry;
pub mod state;

// Re-exports
pub use api::{AppState, build_router};
pub use auth::{JwtVerifier, TokenVerifier};
pub use build::BuildService;
pub use compiler::{CompiledSpec, ImageSpecCompiler};
pub use config::AppConfig;
pub use constants::*;
pub use controller::{RuntimeController, Teardown};
pub use engine::{ContainerEngine, InstanceHandle, MemoryLimit, RunSpec};
pub use error::{Error, Result};
pub use logs::LogRetriever;
pub use manager::{CreatedEnvironment, EnvironmentSpec, LifecycleManager, ManagerSettings};
pub use names::NameAllocator;
pub use pool::WorkerPool;
pub use registry::LifecycleRegistry;
pub use state::{Environment, EnvironmentStats, EnvironmentStatus, EnvironmentSummary};
