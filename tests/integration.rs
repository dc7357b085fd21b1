use std::fs;
use std::sync::Arc;
use std::time::Duration;

use rax_confine::config::{RuntimeConfig, RuntimeHandle, StartupConfig, UnreadablePolicy};
use rax_confine::quota::BYTES_PER_MIB;
use rax_confine::{FsError, ServerRegistry};
use tempfile::TempDir;

// Helper to build a data directory holding srv-1 and its sibling srv-10
fn setup_data_dir() -> (TempDir, StartupConfig) {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("volumes");
    fs::create_dir_all(data.join("srv-1/world/region")).unwrap();
    fs::create_dir_all(data.join("srv-10")).unwrap();
    fs::write(data.join("srv-1/ten.bin"), vec![0u8; 10]).unwrap();
    fs::write(data.join("srv-1/world/twenty.bin"), vec![0u8; 20]).unwrap();
    fs::write(data.join("srv-1/world/region/thirty.bin"), vec![0u8; 30]).unwrap();
    fs::write(data.join("srv-10/x"), b"not yours").unwrap();

    let mut startup = StartupConfig {
        data_directory: data.to_string_lossy().into_owned(),
        walk_concurrency: 4,
        unreadable_directories: UnreadablePolicy::Skip,
    };
    startup.prepare_data_directory().unwrap();
    (tmp, startup)
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let (_tmp, startup) = setup_data_dir();
    let handle = RuntimeHandle::new(RuntimeConfig::default());
    let registry = ServerRegistry::new(&startup, handle.subscribe());
    let server = registry.create("srv-1", 0).await.unwrap();

    for attempt in ["../srv-10/x", "world/../../srv-10/x", "/../../../etc/passwd"] {
        let err = server.safe_path(attempt).unwrap_err();
        assert!(err.is_path_escape(), "{attempt} was not rejected: {err}");
    }

    assert_eq!(
        server.safe_path("world/twenty.bin").unwrap(),
        startup.data_path().join("srv-1/world/twenty.bin")
    );
    assert_eq!(
        server.safe_path("world/new-dir/level.dat").unwrap(),
        startup.data_path().join("srv-1/world/new-dir/level.dat")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_sibling_with_shared_prefix_is_rejected() {
    let (_tmp, startup) = setup_data_dir();
    let data = startup.data_path();
    std::os::unix::fs::symlink(data.join("srv-10"), data.join("srv-1/shortcut")).unwrap();

    let handle = RuntimeHandle::new(RuntimeConfig::default());
    let registry = ServerRegistry::new(&startup, handle.subscribe());
    let server = registry.create("srv-1", 0).await.unwrap();

    let err = server.safe_path("shortcut/x").unwrap_err();
    assert!(matches!(err, FsError::PathEscape(_)));

    // The link counts as its own length; the sibling's bytes are never added
    let link_len = fs::symlink_metadata(data.join("srv-1/shortcut")).unwrap().len();
    assert_eq!(server.directory_size("/").await.unwrap(), 60 + link_len);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_directory_size_repeated_concurrently() {
    let (_tmp, startup) = setup_data_dir();
    let handle = RuntimeHandle::new(RuntimeConfig::default());
    let registry = Arc::new(ServerRegistry::new(&startup, handle.subscribe()));
    registry.create("srv-1", 0).await.unwrap();

    let mut runs = tokio::task::JoinSet::new();
    for _ in 0..24 {
        let registry = Arc::clone(&registry);
        runs.spawn(async move {
            let server = registry.get("srv-1").await.unwrap();
            server.directory_size("/").await.unwrap()
        });
    }

    while let Some(size) = runs.join_next().await {
        assert_eq!(size.unwrap(), 60);
    }
}

#[tokio::test]
async fn test_unlimited_quota_always_fits() {
    let (_tmp, startup) = setup_data_dir();
    let handle = RuntimeHandle::new(RuntimeConfig::default());
    let registry = ServerRegistry::new(&startup, handle.subscribe());

    let server = registry.create("srv-1", 0).await.unwrap();
    fs::write(server.path().join("huge.bin"), vec![0u8; 3 * BYTES_PER_MIB as usize]).unwrap();
    assert!(server.has_space_available().await);
    assert_eq!(server.quota().cached_usage(), None);

    server.quota().set_disk_limit(-1);
    assert!(server.has_space_available().await);
}

#[tokio::test(start_paused = true)]
async fn test_quota_uses_cached_usage_within_interval() {
    let (_tmp, startup) = setup_data_dir();
    let handle = RuntimeHandle::new(RuntimeConfig::default());
    let registry = ServerRegistry::new(&startup, handle.subscribe());
    let server = registry.create("srv-1", 2).await.unwrap();

    assert!(server.has_space_available().await);
    assert_eq!(server.quota().cached_usage(), Some(60));

    fs::write(server.path().join("huge.bin"), vec![0u8; 3 * BYTES_PER_MIB as usize]).unwrap();

    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    assert!(server.has_space_available().await);

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    assert!(!server.has_space_available().await);
    assert_eq!(
        server.quota().cached_usage(),
        Some(60 + 3 * BYTES_PER_MIB)
    );
}

#[tokio::test(start_paused = true)]
async fn test_runtime_interval_update_is_observed() {
    let (_tmp, startup) = setup_data_dir();
    let handle = RuntimeHandle::new(RuntimeConfig::default());
    let registry = ServerRegistry::new(&startup, handle.subscribe());
    let server = registry.create("srv-1", 1).await.unwrap();

    handle.update(|c| c.disk_check_interval = 30);
    assert!(server.has_space_available().await);
    fs::write(server.path().join("huge.bin"), vec![0u8; 3 * BYTES_PER_MIB as usize]).unwrap();

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!server.has_space_available().await);

    handle.update(|c| c.disk_check_interval = 0);
    assert!(server.has_space_available().await);
}
