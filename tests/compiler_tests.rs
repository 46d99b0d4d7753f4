//! Tests for build context compilation.
//!
//! Validates descriptor content, tag derivation, context layout, and
//! filesystem failure handling.

use cloudlab::compiler::ImageSpecCompiler;
use cloudlab::constants::DESCRIPTOR_FILE_NAME;
use cloudlab::error::Error;
use std::fs;
use tempfile::TempDir;

fn compiler() -> (TempDir, ImageSpecCompiler) {
    let dir = TempDir::new().unwrap();
    let compiler = ImageSpecCompiler::new(dir.path().join("generated")).unwrap();
    (dir, compiler)
}

// =============================================================================
// Descriptor
// =============================================================================

#[test]
fn test_keep_alive_descriptor() {
    let (_dir, compiler) = compiler();
    let spec = compiler.compile("ubuntu-1", "ubuntu:latest", None).unwrap();

    assert_eq!(spec.image_tag, "ubuntu-1_img");
    assert_eq!(
        spec.descriptor,
        "FROM ubuntu:latest\nCMD [\"sleep\",\"infinity\"]\n"
    );
    assert_eq!(fs::read_to_string(spec.descriptor_path()).unwrap(), spec.descriptor);
}

#[test]
fn test_only_last_command_line_is_entrypoint() {
    let (_dir, compiler) = compiler();
    let spec = compiler
        .compile("lab-1", "alpine:3.19", Some("echo A\necho B"))
        .unwrap();

    assert_eq!(
        spec.descriptor,
        "FROM alpine:3.19\nCMD [\"sh\",\"-c\",\"echo B\"]\n"
    );
    assert!(!spec.descriptor.contains("echo A"));
}

#[test]
fn test_whitespace_block_is_keep_alive() {
    let (_dir, compiler) = compiler();
    let spec = compiler.compile("lab-1", "alpine", Some("   \n\n  ")).unwrap();
    assert!(spec.descriptor.contains("\"sleep\",\"infinity\""));
}

#[test]
fn test_invalid_base_image_rejected() {
    let (dir, compiler) = compiler();
    let err = compiler
        .compile("lab-1", "alpine\nRUN curl evil", None)
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert!(!dir.path().join("generated").join("lab-1").exists());
}

// =============================================================================
// Context Layout
// =============================================================================

#[test]
fn test_context_holds_exactly_one_descriptor() {
    let (_dir, compiler) = compiler();
    let first = compiler.compile("lab-1", "alpine", None).unwrap();
    fs::write(first.context_dir.join("stale.txt"), "leftover").unwrap();

    let second = compiler
        .compile("lab-1", "alpine", Some("python3 -m http.server"))
        .unwrap();

    let entries: Vec<_> = fs::read_dir(&second.context_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(entries, vec![DESCRIPTOR_FILE_NAME.to_string()]);
    assert!(second.descriptor.contains("python3 -m http.server"));
}

#[test]
fn test_tag_is_lowercased_and_folded() {
    let (_dir, compiler) = compiler();
    let spec = compiler.compile("My.Lab-1", "alpine", None).unwrap();
    assert_eq!(spec.image_tag, "my.lab-1_img");
}

#[test]
fn test_unwritable_root_is_compile_failure() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("generated");
    let compiler = ImageSpecCompiler::new(&root).unwrap();

    // Replace the root directory with a plain file.
    fs::remove_dir_all(&root).unwrap();
    fs::write(&root, "not a directory").unwrap();

    let err = compiler.compile("lab-1", "alpine", None).unwrap_err();
    assert!(matches!(err, Error::CompileFailed { ref name, .. } if name == "lab-1"));
}
