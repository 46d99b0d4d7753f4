//! # Lifecycle Constants
//!
//! Defines the defaults, bounds, and fixed strings used by the environment
//! lifecycle. These constants are the **single source of truth** for values
//! that appear in generated build descriptors, engine calls, and API
//! validation.
//!
//! ## Cross-References
//!
//! - [`crate::compiler`]: Uses the tag suffix, keep-alive entrypoint, and
//!   descriptor file name
//! - [`crate::controller`]: Uses the short-id length and stop timeout
//! - [`crate::logs`]: Uses the log sentinels
//! - [`crate::names`]: Uses the name allowlist and fallback base
//! - [`crate::api`]: Uses the port range and input bounds

use std::time::Duration;

// =============================================================================
// Images and Build Descriptors
// =============================================================================

/// Base image used when a create request names none.
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:latest";

/// Suffix appended to the sanitized environment name to form the image tag.
pub const IMAGE_TAG_SUFFIX: &str = "_img";

/// File name of the single descriptor written into each build context.
pub const DESCRIPTOR_FILE_NAME: &str = "Dockerfile";

/// Entrypoint used when no commands are supplied.
///
/// Idles forever so the environment stays reachable without user work.
pub const KEEP_ALIVE_ENTRYPOINT: [&str; 2] = ["sleep", "infinity"];

/// Shell that runs the user-supplied entrypoint line.
pub const ENTRYPOINT_SHELL: [&str; 2] = ["sh", "-c"];

/// Maximum image reference length in bytes.
///
/// **Security**: The reference is written verbatim into the `FROM` line of the
/// descriptor. Bounding it keeps descriptors small and parsers happy.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Valid characters for image references.
///
/// Includes: `a-z`, `A-Z`, `0-9`, `-`, `_`, `.`, `/`, `:`, `@`
///
/// **Security**: Excludes whitespace and newlines, which would let a caller
/// append extra instructions to the descriptor.
pub const IMAGE_REF_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_./:@";

/// Maximum size of a command block (64 KiB).
pub const MAX_COMMAND_BLOCK_LEN: usize = 64 * 1024;

// =============================================================================
// Names
// =============================================================================

/// Allocation base used when neither a name nor an image yields one.
pub const DEFAULT_NAME_BASE: &str = "env";

/// Valid characters for environment names.
///
/// Matches what container engines accept for instance names. Anything else is
/// folded to `-` before allocation.
pub const ENVIRONMENT_NAME_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.";

/// Maximum length of an allocation base, before the `-<n>` suffix.
pub const MAX_NAME_BASE_LEN: usize = 48;

// =============================================================================
// Engine Identities
// =============================================================================

/// Length of the short engine id recorded for each environment.
pub const SHORT_ID_LEN: usize = 12;

// =============================================================================
// Ports and Resources
// =============================================================================

/// Lowest port a caller may bind.
pub const MIN_PORT: i64 = 1;

/// Highest port a caller may bind.
pub const MAX_PORT: i64 = 65535;

// =============================================================================
// Timeouts and Workers
// =============================================================================

/// Graceful stop period handed to the engine before it kills the instance.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of concurrent build/run jobs.
pub const DEFAULT_BUILD_WORKERS: usize = 4;

// =============================================================================
// Log Sentinels
// =============================================================================

/// Returned by log retrieval when the engine has no such instance.
pub const LOGS_NOT_FOUND_TEXT: &str = "No logs (container not found)";

/// Returned by log retrieval when the engine fails for any other reason.
pub const LOGS_UNAVAILABLE_TEXT: &str = "No logs (engine unavailable)";

// =============================================================================
// Validation Helpers
// =============================================================================

/// Validates an image reference before it is written into a descriptor.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
#[must_use = "validation result must be checked before writing a descriptor"]
pub fn validate_image_ref(reference: &str) -> std::result::Result<(), &'static str> {
    if reference.is_empty() {
        return Err("image reference cannot be empty");
    }
    if reference.len() > MAX_IMAGE_REF_LEN {
        return Err("image reference exceeds maximum length");
    }
    if !reference.chars().all(|c| IMAGE_REF_VALID_CHARS.contains(c)) {
        return Err("image reference contains invalid characters");
    }
    Ok(())
}

/// Validates a port number supplied by a caller.
#[inline]
#[must_use = "validation result must be checked before binding a port"]
pub fn validate_port(port: i64) -> std::result::Result<u16, &'static str> {
    if !(MIN_PORT..=MAX_PORT).contains(&port) {
        return Err("port must be between 1 and 65535");
    }
    u16::try_from(port).map_err(|_| "port must be between 1 and 65535")
}
