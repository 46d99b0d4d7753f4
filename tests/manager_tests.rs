//! Tests for the lifecycle manager.
//!
//! Exercises create/list/start/stop/delete/logs end to end against the
//! in-memory engine.

use cloudlab::constants::LOGS_NOT_FOUND_TEXT;
use cloudlab::engine::{ContainerEngine, MemoryLimit};
use cloudlab::engines::MemoryEngine;
use cloudlab::error::Error;
use cloudlab::manager::{EnvironmentSpec, LifecycleManager, ManagerSettings};
use cloudlab::state::EnvironmentStatus;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    engine: Arc<MemoryEngine>,
    manager: Arc<LifecycleManager>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MemoryEngine::new());
    let mut settings = ManagerSettings::new(dir.path().join("generated"));
    settings.build_workers = 2;
    let manager = LifecycleManager::new(engine.clone(), settings).unwrap();
    Fixture {
        dir,
        engine,
        manager: Arc::new(manager),
    }
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_then_list_round_trip() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(8080)).await.unwrap();

    assert_eq!(created.name, "ubuntu-1");
    assert_eq!(created.port, 8080);

    let listed = f.manager.list("ada").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, created.name);
    assert_eq!(listed[0].engine_id, created.engine_id);
    assert_eq!(listed[0].port, 8080);
    assert_eq!(listed[0].status, EnvironmentStatus::Running);
    assert_eq!(listed[0].image_tag, "ubuntu-1_img");
    assert_eq!(listed[0].owner, "ada");
}

#[tokio::test]
async fn test_create_writes_context_under_build_root() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();

    let descriptor = f
        .dir
        .path()
        .join("generated")
        .join(&created.name)
        .join("Dockerfile");
    assert!(descriptor.exists());
}

#[tokio::test]
async fn test_keep_alive_environment_stays_running() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();

    let descriptor = f.engine.image_descriptor("ubuntu-1_img").unwrap().unwrap();
    assert!(descriptor.contains("[\"sleep\",\"infinity\"]"));
    assert!(f.engine.instance(&created.engine_id).unwrap().unwrap().running);
    assert_eq!(f.manager.stats("ada").unwrap().running_containers, 1);
}

#[tokio::test]
async fn test_only_last_command_runs() {
    let f = fixture();
    let spec = EnvironmentSpec {
        commands: Some("echo A\necho B".to_string()),
        ..EnvironmentSpec::new(80)
    };
    f.manager.create("ada", spec).await.unwrap();

    let descriptor = f.engine.image_descriptor("ubuntu-1_img").unwrap().unwrap();
    assert!(descriptor.contains("[\"sh\",\"-c\",\"echo B\"]"));
    assert!(!descriptor.contains("echo A"));
}

#[tokio::test]
async fn test_create_uses_name_and_image_for_base() {
    let f = fixture();
    let named = EnvironmentSpec {
        name: Some("web".to_string()),
        image: Some("nginx:1.25".to_string()),
        mem_limit: Some(MemoryLimit::parse("128m").unwrap()),
        cpu_limit: Some(2),
        ..EnvironmentSpec::new(8081)
    };
    let by_image = EnvironmentSpec {
        image: Some("ghcr.io/org/tool:1".to_string()),
        ..EnvironmentSpec::new(8082)
    };

    let a = f.manager.create("ada", named).await.unwrap();
    let b = f.manager.create("ada", by_image).await.unwrap();
    assert_eq!(a.name, "web-1");
    assert_eq!(b.name, "tool-1");

    let instance = f.engine.instance(&a.engine_id).unwrap().unwrap();
    assert_eq!(instance.mem_limit.unwrap().bytes(), 128 * 1024 * 1024);
}

#[tokio::test]
async fn test_names_unique_across_owners() {
    let f = fixture();
    let a = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    let b = f.manager.create("bob", EnvironmentSpec::new(81)).await.unwrap();
    assert_eq!(a.name, "ubuntu-1");
    assert_eq!(b.name, "ubuntu-2");
}

#[tokio::test]
async fn test_names_differing_by_case_keep_separate_images() {
    let f = fixture();
    let ada = EnvironmentSpec {
        name: Some("Web".to_string()),
        commands: Some("echo ADA".to_string()),
        ..EnvironmentSpec::new(8081)
    };
    let bob = EnvironmentSpec {
        name: Some("web".to_string()),
        commands: Some("echo BOB".to_string()),
        ..EnvironmentSpec::new(8082)
    };

    let a = f.manager.create("ada", ada).await.unwrap();
    let b = f.manager.create("bob", bob).await.unwrap();
    assert_eq!(a.name, "web-1");
    assert_eq!(b.name, "web-2");

    f.manager.stop(&a.name, "ada").await.unwrap();
    let restarted = f.manager.start(&a.name, "ada").await.unwrap();
    assert_eq!(restarted.image_tag, "web-1_img");

    let descriptor = f.engine.image_descriptor(&restarted.image_tag).unwrap().unwrap();
    assert!(descriptor.contains("echo ADA"));
    assert!(!descriptor.contains("echo BOB"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_unique_names() {
    let f = fixture();

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let manager = Arc::clone(&f.manager);
            tokio::spawn(async move {
                manager
                    .create("ada", EnvironmentSpec::new(9000 + i))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut names = HashSet::new();
    for task in tasks {
        assert!(names.insert(task.await.unwrap().name));
    }
    assert_eq!(f.manager.list("ada").unwrap().len(), 12);
    assert_eq!(f.engine.instance_count().unwrap(), 12);
}

#[tokio::test]
async fn test_abandoned_create_is_still_recorded() {
    let f = fixture();
    f.engine.set_latency(Duration::from_millis(100)).unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        f.manager.create("ada", EnvironmentSpec::new(80)),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(f.engine.instance_count().unwrap(), 1);
    let listed = f.manager.list("ada").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "ubuntu-1");

    f.manager.delete("ubuntu-1", "ada").await.unwrap();
    assert!(!f.manager.registry().is_name_taken("ubuntu-1").unwrap());
}

#[tokio::test]
async fn test_abandoned_failed_create_releases_name() {
    let f = fixture();
    f.engine.set_latency(Duration::from_millis(100)).unwrap();
    f.engine.fail_runs_with("port is already allocated").unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        f.manager.create("ada", EnvironmentSpec::new(80)),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!f.manager.registry().is_name_taken("ubuntu-1").unwrap());
    assert_eq!(f.engine.instance_count().unwrap(), 0);
}

#[tokio::test]
async fn test_validation_precedes_engine() {
    let f = fixture();
    let spec = EnvironmentSpec {
        image: Some("bad image".to_string()),
        ..EnvironmentSpec::new(80)
    };

    let err = f.manager.create("ada", spec).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(f.engine.build_count().unwrap(), 0);
    assert!(f.manager.list("ada").unwrap().is_empty());
}

#[tokio::test]
async fn test_build_failure_releases_name() {
    let f = fixture();
    f.engine.fail_builds_with("manifest unknown").unwrap();

    let err = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap_err();
    assert!(matches!(err, Error::BuildFailed { .. }));
    assert!(err.to_string().contains("manifest unknown"));
    assert!(f.manager.list("ada").unwrap().is_empty());

    f.engine.clear_failures().unwrap();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    assert_eq!(created.name, "ubuntu-1");
}

#[tokio::test]
async fn test_run_failure_keeps_image_and_records_nothing() {
    let f = fixture();
    f.engine.fail_runs_with("port is already allocated").unwrap();

    let err = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap_err();
    assert!(matches!(err, Error::RunFailed { .. }));
    assert!(f.engine.image_descriptor("ubuntu-1_img").unwrap().is_some());
    assert_eq!(f.engine.instance_count().unwrap(), 0);
    assert!(f.manager.registry().is_empty().unwrap());
}

// =============================================================================
// Stop / Start
// =============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();

    let first = f.manager.stop(&created.name, "ada").await.unwrap();
    assert_eq!(first.status, EnvironmentStatus::Exited);
    assert!(!f.engine.instance(&created.engine_id).unwrap().unwrap().running);

    let second = f.manager.stop(&created.name, "ada").await.unwrap();
    assert_eq!(second.status, EnvironmentStatus::Exited);
    assert_eq!(second.engine_id, first.engine_id);
}

#[tokio::test]
async fn test_stop_absorbs_engine_errors() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.engine.fail_teardown_with("daemon unreachable").unwrap();

    let stopped = f.manager.stop(&created.name, "ada").await.unwrap();
    assert_eq!(stopped.status, EnvironmentStatus::Exited);
}

#[tokio::test]
async fn test_start_replaces_instance() {
    let f = fixture();
    let spec = EnvironmentSpec {
        mem_limit: Some(MemoryLimit::parse("64m").unwrap()),
        ..EnvironmentSpec::new(7000)
    };
    let created = f.manager.create("ada", spec).await.unwrap();
    f.manager.stop(&created.name, "ada").await.unwrap();

    let started = f.manager.start(&created.name, "ada").await.unwrap();
    assert_eq!(started.status, EnvironmentStatus::Running);
    assert_ne!(started.engine_id, created.engine_id);
    assert!(f.engine.instance(&created.engine_id).unwrap().is_none());

    let instance = f.engine.instance(&started.engine_id).unwrap().unwrap();
    assert!(instance.running);
    assert_eq!(instance.port, 7000);
    assert_eq!(instance.mem_limit.unwrap().bytes(), 64 * 1024 * 1024);
    assert_eq!(f.engine.instance_count().unwrap(), 1);
}

#[tokio::test]
async fn test_start_running_is_noop() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();

    let started = f.manager.start(&created.name, "ada").await.unwrap();
    assert_eq!(started.engine_id, created.engine_id);
    assert_eq!(f.engine.instance_count().unwrap(), 1);
}

#[tokio::test]
async fn test_start_run_failure_keeps_record_exited() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.manager.stop(&created.name, "ada").await.unwrap();
    f.engine.fail_runs_with("no space left on device").unwrap();

    let err = f.manager.start(&created.name, "ada").await.unwrap_err();
    assert!(matches!(err, Error::RunFailed { .. }));
    assert_eq!(
        f.manager.registry().find(&created.name, "ada").unwrap().status,
        EnvironmentStatus::Exited
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_during_start_is_not_lost() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.manager.stop(&created.name, "ada").await.unwrap();
    f.engine.set_latency(Duration::from_millis(100)).unwrap();

    let start = {
        let manager = Arc::clone(&f.manager);
        let name = created.name.clone();
        tokio::spawn(async move { manager.start(&name, "ada").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stopped = f.manager.stop(&created.name, "ada").await.unwrap();
    let started = start.await.unwrap().unwrap();

    assert_eq!(started.status, EnvironmentStatus::Running);
    assert_eq!(stopped.status, EnvironmentStatus::Exited);
    assert_eq!(stopped.engine_id, started.engine_id);

    let record = f.manager.registry().find(&created.name, "ada").unwrap();
    assert_eq!(record.status, EnvironmentStatus::Exited);
    assert!(!f.engine.instance(&record.engine_id).unwrap().unwrap().running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_starts_converge() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.manager.stop(&created.name, "ada").await.unwrap();
    f.engine.set_latency(Duration::from_millis(50)).unwrap();

    let starts: Vec<_> = (0..2)
        .map(|_| {
            let manager = Arc::clone(&f.manager);
            let name = created.name.clone();
            tokio::spawn(async move { manager.start(&name, "ada").await })
        })
        .collect();

    let mut ids = HashSet::new();
    for start in starts {
        let started = start.await.unwrap().unwrap();
        assert_eq!(started.status, EnvironmentStatus::Running);
        ids.insert(started.engine_id);
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(f.engine.instance_count().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_during_start_leaves_nothing_running() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.manager.stop(&created.name, "ada").await.unwrap();
    f.engine.set_latency(Duration::from_millis(100)).unwrap();

    let start = {
        let manager = Arc::clone(&f.manager);
        let name = created.name.clone();
        tokio::spawn(async move { manager.start(&name, "ada").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    f.manager.delete(&created.name, "ada").await.unwrap();
    start.await.unwrap().unwrap();

    assert!(f.manager.list("ada").unwrap().is_empty());
    assert_eq!(f.engine.instance_count().unwrap(), 0);
}

// =============================================================================
// Delete / Logs
// =============================================================================

#[tokio::test]
async fn test_delete_twice() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();

    f.manager.delete(&created.name, "ada").await.unwrap();
    assert_eq!(f.engine.instance_count().unwrap(), 0);
    assert!(f.engine.image_descriptor("ubuntu-1_img").unwrap().is_some());

    assert!(matches!(
        f.manager.delete(&created.name, "ada").await,
        Err(Error::EnvironmentNotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_with_instance_already_gone() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.engine.remove(&created.engine_id, true).await.unwrap();

    f.manager.delete(&created.name, "ada").await.unwrap();
    assert!(f.manager.list("ada").unwrap().is_empty());
}

#[tokio::test]
async fn test_logs() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    f.engine.append_logs(&created.engine_id, b"ready\n").unwrap();

    assert_eq!(f.manager.logs(&created.name, "ada").await.unwrap(), "ready\n");

    f.engine.remove(&created.engine_id, true).await.unwrap();
    assert_eq!(
        f.manager.logs(&created.name, "ada").await.unwrap(),
        LOGS_NOT_FOUND_TEXT
    );
}

// =============================================================================
// Ownership Isolation
// =============================================================================

#[tokio::test]
async fn test_other_owner_sees_nothing() {
    let f = fixture();
    let created = f.manager.create("ada", EnvironmentSpec::new(80)).await.unwrap();
    let name = created.name.as_str();

    assert!(f.manager.list("bob").unwrap().is_empty());
    assert!(matches!(
        f.manager.start(name, "bob").await,
        Err(Error::EnvironmentNotFound(_))
    ));
    assert!(matches!(
        f.manager.stop(name, "bob").await,
        Err(Error::EnvironmentNotFound(_))
    ));
    assert!(matches!(
        f.manager.logs(name, "bob").await,
        Err(Error::EnvironmentNotFound(_))
    ));
    assert!(matches!(
        f.manager.delete(name, "bob").await,
        Err(Error::EnvironmentNotFound(_))
    ));

    let record = f.manager.registry().find(name, "ada").unwrap();
    assert_eq!(record.status, EnvironmentStatus::Running);
    assert!(f.engine.instance(&created.engine_id).unwrap().unwrap().running);
}
