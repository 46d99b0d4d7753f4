//! Process configuration from `CLOUDLAB_*` environment variables.

use crate::constants::{DEFAULT_BUILD_WORKERS, DEFAULT_STOP_TIMEOUT};
use crate::engines::EngineKind;
use crate::manager::ManagerSettings;
use anyhow::{Context, Result, bail};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub build_dir: PathBuf,
    pub engine: EngineKind,
    pub build_workers: usize,
    pub stop_timeout: Duration,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("CLOUDLAB_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("CLOUDLAB_PORT")
            .unwrap_or_else(|| "8000".to_string())
            .parse::<u16>()
            .context("CLOUDLAB_PORT must be a valid u16")?;

        let jwt_secret = lookup("CLOUDLAB_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .context("CLOUDLAB_JWT_SECRET must be set")?;

        let build_dir = match lookup("CLOUDLAB_BUILD_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_build_dir(),
        };

        let engine_name = lookup("CLOUDLAB_ENGINE").unwrap_or_else(|| "docker".to_string());
        let engine = match EngineKind::from_name(&engine_name) {
            Some(kind) => kind,
            None => bail!("CLOUDLAB_ENGINE must be 'docker' or 'memory', got '{}'", engine_name),
        };

        let build_workers = match lookup("CLOUDLAB_BUILD_WORKERS") {
            Some(raw) => raw
                .parse::<usize>()
                .context("CLOUDLAB_BUILD_WORKERS must be a positive integer")?,
            None => DEFAULT_BUILD_WORKERS,
        };
        if build_workers == 0 {
            bail!("CLOUDLAB_BUILD_WORKERS must be at least 1");
        }

        let stop_timeout = match lookup("CLOUDLAB_STOP_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("CLOUDLAB_STOP_TIMEOUT_SECS must be a valid u64")?,
            ),
            None => DEFAULT_STOP_TIMEOUT,
        };

        Ok(Self {
            host,
            port,
            jwt_secret,
            build_dir,
            engine,
            build_workers,
            stop_timeout,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            build_root: self.build_dir.clone(),
            build_workers: self.build_workers,
            stop_timeout: self.stop_timeout,
        }
    }
}

/// `~/.cloudlab/generated`, or a relative `generated` without a home dir.
fn default_build_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".cloudlab").join("generated"))
        .unwrap_or_else(|| PathBuf::from("generated"))
}
