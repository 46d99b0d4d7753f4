//! # Docker Engine - Docker Engine API Backend
//!
//! Implements the [`ContainerEngine`] trait over the Docker Engine API using
//! `bollard`, talking to the local daemon socket (or `DOCKER_HOST`).
//!
//! ## Build Contexts
//!
//! The build context directory is archived as a gzip-compressed tarball and
//! streamed to the daemon. Intermediate containers are always removed
//! (`rm` + `forcerm`). The first error reported in the build stream fails the
//! build with the daemon's message unchanged.
//!
//! ## Instances
//!
//! Instances are created detached with a single published port mapped to
//! the identical container port. Only the memory limit is forwarded; CPU
//! shares are never set.
//!
//! ## Not Found Mapping
//!
//! A `404` from the daemon becomes [`Error::InstanceNotFound`]. A `304` on
//! stop (already stopped) counts as success.
//!
//! [`ContainerEngine`]: crate::engine::ContainerEngine
//! [`Error::InstanceNotFound`]: crate::error::Error::InstanceNotFound

use crate::engine::{ContainerEngine, InstanceHandle, RunSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Docker Engine API backend.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects to the local daemon using the platform defaults.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::engine("connect", e))?;
        info!("docker engine client ready");
        Ok(Self { docker })
    }

    /// Wraps an existing client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

/// Maps a daemon error, turning `404` into [`Error::InstanceNotFound`].
fn map_error(operation: &str, id: &str, error: BollardError) -> Error {
    match error {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => Error::InstanceNotFound(id.to_string()),
        other => passthrough_error(operation, other),
    }
}

/// Maps a daemon error, keeping the daemon's message for every status.
fn passthrough_error(operation: &str, error: BollardError) -> Error {
    match error {
        BollardError::DockerResponseServerError { message, .. } => Error::engine(operation, message),
        other => Error::engine(operation, other),
    }
}

/// Archives a build context directory as a gzip-compressed tarball.
fn archive_context(context: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", context)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    fn name(&self) -> &str {
        "docker"
    }

    async fn build_image(&self, context: &Path, tag: &str) -> Result<()> {
        let context: PathBuf = context.to_path_buf();
        let body = tokio::task::spawn_blocking(move || archive_context(&context))
            .await
            .map_err(|e| Error::Internal(format!("context archiver panicked: {}", e)))??;

        debug!("streaming {} byte build context for {}", body.len(), tag);

        let options = BuildImageOptions {
            dockerfile: crate::constants::DESCRIPTOR_FILE_NAME.to_string(),
            t: tag.to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(body.into()));
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    if let Some(message) = info.error {
                        return Err(Error::engine("build", message));
                    }
                    if let Some(line) = info.stream {
                        let line = line.trim_end();
                        if !line.is_empty() {
                            debug!("[build {}] {}", tag, line);
                        }
                    }
                }
                Err(e) => return Err(passthrough_error("build", e)),
            }
        }

        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<InstanceHandle> {
        let port_key = format!("{}/tcp", spec.port);

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(spec.port.to_string()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let memory = match spec.mem_limit {
            Some(limit) => Some(
                i64::try_from(limit.bytes())
                    .map_err(|_| Error::validation("ram_limit is too large"))?,
            ),
            None => None,
        };

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            memory,
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image_tag.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| passthrough_error("run", e))?;

        for warning in &created.warnings {
            debug!("[run {}] {}", spec.name, warning);
        }

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| passthrough_error("run", e))?;

        Ok(InstanceHandle::new(created.id))
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: stop_timeout_secs(timeout),
        };

        match self.docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_error("stop", id, e)),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| map_error("remove", id, e))
    }

    async fn exists(&self, id_or_name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_container(id_or_name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => Ok(true),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(passthrough_error("inspect", e)),
        }
    }

    async fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut output = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_error("logs", id, e))?;
            output.extend_from_slice(&chunk.into_bytes());
        }

        Ok(output)
    }
}

/// Whole seconds for the engine's stop timeout, saturating at `i64::MAX`.
fn stop_timeout_secs(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX)
}
