//! Request and response bodies.

use crate::constants::validate_port;
use crate::engine::MemoryLimit;
use crate::error::{Error, Result};
use crate::manager::EnvironmentSpec;
use serde::{Deserialize, Serialize};

/// A JSON field that may be sent as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IntOrString {
    Int(i64),
    Str(String),
}

impl IntOrString {
    fn as_int(&self, field: &str) -> Result<i64> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Str(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::validation(format!("{} must be an integer", field))),
        }
    }
}

/// Body of `POST /api/container/create`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub commands: Option<String>,
    #[serde(default)]
    pub cpu_limit: Option<IntOrString>,
    #[serde(default)]
    pub ram_limit: Option<IntOrString>,
    #[serde(default)]
    pub port: Option<IntOrString>,
}

impl CreateRequest {
    /// Parses a raw body. Malformed JSON is a validation error.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| Error::validation(format!("invalid request body: {}", e)))
    }

    /// Converts into a typed spec, checking port and memory limit.
    pub fn into_spec(self) -> Result<EnvironmentSpec> {
        let port = self
            .port
            .ok_or_else(|| Error::validation("port is required"))?
            .as_int("port")?;
        let port = validate_port(port).map_err(Error::validation)?;

        let mem_limit = match self.ram_limit {
            None => None,
            Some(IntOrString::Int(bytes)) => {
                let bytes = u64::try_from(bytes)
                    .map_err(|_| Error::validation("ram_limit must be positive"))?;
                Some(MemoryLimit::from_bytes(bytes)?)
            }
            Some(IntOrString::Str(raw)) if raw.trim().is_empty() => None,
            Some(IntOrString::Str(raw)) => Some(MemoryLimit::parse(&raw)?),
        };

        // Never applied, so an unparseable value is dropped rather than rejected.
        let cpu_limit = self.cpu_limit.and_then(|v| v.as_int("cpu_limit").ok());

        let spec = EnvironmentSpec {
            name: self.name,
            image: self.image,
            commands: self.commands,
            cpu_limit,
            mem_limit,
            port,
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub engine: String,
}
