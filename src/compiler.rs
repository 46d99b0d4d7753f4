//! # Image Spec Compiler
//!
//! Turns a create request (base image + optional command block) into a build
//! context directory holding exactly one descriptor, plus the image tag the
//! build will produce.
//!
//! ## Layout
//!
//! ```text
//! <build root>/
//! └── <environment name>/
//!     └── Dockerfile
//! ```
//!
//! The context directory is recreated on every compile, so it never holds
//! anything but the descriptor.
//!
//! ## Entrypoint Rules
//!
//! | Command block            | Entrypoint                     |
//! |--------------------------|--------------------------------|
//! | absent or whitespace     | `["sleep", "infinity"]`        |
//! | one or more lines        | `["sh", "-c", "<last line>"]`  |
//!
//! Only the **last** non-blank line runs. Earlier lines are accepted but have
//! no effect on the image.
//!
//! The entrypoint is written in exec form and JSON-encoded, which escapes
//! quotes and backslashes in the user's line.

use crate::constants::{
    DESCRIPTOR_FILE_NAME, ENTRYPOINT_SHELL, IMAGE_TAG_SUFFIX, KEEP_ALIVE_ENTRYPOINT,
    validate_image_ref,
};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Output of a successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSpec {
    /// Environment name the context was compiled for.
    pub name: String,
    /// Directory handed to the build.
    pub context_dir: PathBuf,
    /// Tag the build produces.
    pub image_tag: String,
    /// Descriptor text as written.
    pub descriptor: String,
}

impl CompiledSpec {
    /// Path of the descriptor inside the context.
    pub fn descriptor_path(&self) -> PathBuf {
        self.context_dir.join(DESCRIPTOR_FILE_NAME)
    }
}

/// Writes build contexts under a root directory.
pub struct ImageSpecCompiler {
    root: PathBuf,
}

impl ImageSpecCompiler {
    /// Creates a compiler rooted at `root`, creating the directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::CompileFailed {
            name: root.display().to_string(),
            reason: format!("cannot create build root: {}", e),
        })?;

        info!("build contexts stored at {}", root.display());
        Ok(Self { root })
    }

    /// Returns the build root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compiles the build context for `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `base_image` is not a valid reference
    /// - [`Error::CompileFailed`] if the context cannot be written
    pub fn compile(
        &self,
        name: &str,
        base_image: &str,
        commands: Option<&str>,
    ) -> Result<CompiledSpec> {
        validate_image_ref(base_image).map_err(Error::validation)?;

        let entrypoint = entrypoint(commands);
        let descriptor = render_descriptor(base_image, &entrypoint)?;
        let context_dir = self.root.join(name);

        write_context(&context_dir, &descriptor).map_err(|e| Error::CompileFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let image_tag = image_tag(name);
        debug!(
            "compiled {} from {} into {}",
            image_tag,
            base_image,
            context_dir.display()
        );

        Ok(CompiledSpec {
            name: name.to_string(),
            context_dir,
            image_tag,
            descriptor,
        })
    }
}

/// Derives the image tag for an environment name.
///
/// Lower-cases the name, folds anything outside `[a-z0-9._-]` to `_`, and
/// appends `_img`.
pub fn image_tag(name: &str) -> String {
    let mut tag: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    tag.push_str(IMAGE_TAG_SUFFIX);
    tag
}

/// Selects the entrypoint argv for a command block.
pub fn entrypoint(commands: Option<&str>) -> Vec<String> {
    let last_line = commands.and_then(|block| {
        block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
    });

    match last_line {
        Some(line) => ENTRYPOINT_SHELL
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(line.to_string()))
            .collect(),
        None => KEEP_ALIVE_ENTRYPOINT.iter().map(|s| s.to_string()).collect(),
    }
}

/// Renders the descriptor text.
pub fn render_descriptor(base_image: &str, entrypoint: &[String]) -> Result<String> {
    let cmd = serde_json::to_string(entrypoint)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(format!("FROM {}\nCMD {}\n", base_image, cmd))
}

/// Recreates `dir` and writes the descriptor into it atomically.
fn write_context(dir: &Path, descriptor: &str) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    let final_path = dir.join(DESCRIPTOR_FILE_NAME);
    let tmp_path = dir.join(format!(".{}.tmp", DESCRIPTOR_FILE_NAME));
    fs::write(&tmp_path, descriptor)?;
    fs::rename(&tmp_path, &final_path)
}
