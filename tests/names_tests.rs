//! Tests for name allocation.
//!
//! Validates probing order, engine namespace collisions, and uniqueness
//! under concurrent callers.

use cloudlab::engines::MemoryEngine;
use cloudlab::names::NameAllocator;
use cloudlab::registry::LifecycleRegistry;
use std::collections::HashSet;
use std::sync::Arc;

fn allocator() -> (Arc<MemoryEngine>, Arc<LifecycleRegistry>, Arc<NameAllocator>) {
    let engine = Arc::new(MemoryEngine::new());
    let registry = Arc::new(LifecycleRegistry::new());
    let allocator = Arc::new(NameAllocator::new(engine.clone(), Arc::clone(&registry)));
    (engine, registry, allocator)
}

// =============================================================================
// Probing
// =============================================================================

#[tokio::test]
async fn test_first_name_is_index_one() {
    let (_, _, allocator) = allocator();
    assert_eq!(allocator.allocate("ubuntu").await.unwrap(), "ubuntu-1");
}

#[tokio::test]
async fn test_sequential_allocations_probe_upward() {
    let (_, _, allocator) = allocator();
    assert_eq!(allocator.allocate("lab").await.unwrap(), "lab-1");
    assert_eq!(allocator.allocate("lab").await.unwrap(), "lab-2");
    assert_eq!(allocator.allocate("lab").await.unwrap(), "lab-3");
    assert_eq!(allocator.allocate("other").await.unwrap(), "other-1");
}

#[tokio::test]
async fn test_skips_names_taken_in_engine() {
    let (engine, _, allocator) = allocator();
    engine.reserve_foreign_name("lab-1").unwrap();
    engine.reserve_foreign_name("lab-2").unwrap();

    assert_eq!(allocator.allocate("lab").await.unwrap(), "lab-3");
}

#[tokio::test]
async fn test_released_name_is_reused() {
    let (_, registry, allocator) = allocator();
    let name = allocator.allocate("lab").await.unwrap();
    registry.release(&name).unwrap();

    assert_eq!(allocator.allocate("lab").await.unwrap(), name);
}

#[tokio::test]
async fn test_base_is_sanitized() {
    let (_, _, allocator) = allocator();
    assert_eq!(allocator.allocate("my lab").await.unwrap(), "my-lab-1");
    assert_eq!(allocator.allocate("").await.unwrap(), "env-1");
}

#[tokio::test]
async fn test_bases_differing_by_case_share_a_sequence() {
    let (_, _, allocator) = allocator();
    assert_eq!(allocator.allocate("Web").await.unwrap(), "web-1");
    assert_eq!(allocator.allocate("web").await.unwrap(), "web-2");
    assert_eq!(allocator.allocate("WEB").await.unwrap(), "web-3");
}

#[tokio::test]
async fn test_separator_runs_are_collapsed() {
    let (_, _, allocator) = allocator();
    assert_eq!(allocator.allocate("a..b").await.unwrap(), "a.b-1");
    assert_eq!(allocator.allocate("a_.b").await.unwrap(), "a_b-1");
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_are_unique() {
    let (_, _, allocator) = allocator();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            tokio::spawn(async move { allocator.allocate("lab").await.unwrap() })
        })
        .collect();

    let mut names = HashSet::new();
    for task in tasks {
        assert!(names.insert(task.await.unwrap()), "duplicate name allocated");
    }
    assert_eq!(names.len(), 32);
    for i in 1..=32 {
        assert!(names.contains(&format!("lab-{}", i)));
    }
}
