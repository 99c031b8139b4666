//! End-to-end rollback workflow tests over a mock transport and the
//! in-memory snapshot store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;
use uuid::Uuid;

use rnetops::brand::Brand;
use rnetops::credentials::ResolvedCredentials;
use rnetops::error::{NetopsError, Result};
use rnetops::rollback::{
    BackupOptions, BatchOptions, RollbackEngine, RollbackOptions, RollbackRequest, RollbackStatus,
};
use rnetops::session::{ConfigTransport, ConnectionParams};
use rnetops::snapshot::{
    ConfigSnapshot, MemorySnapshotStore, SnapshotStore, SnapshotType, checksum_of,
};

/// Scripted device transport: a mutable "running config" plus failure
/// switches and call counters.
struct MockTransport {
    running_config: Mutex<String>,
    fail_fetch: AtomicBool,
    fail_push: AtomicBool,
    fetch_count: AtomicUsize,
    push_count: AtomicUsize,
}

impl MockTransport {
    fn new(config: &str) -> Arc<Self> {
        Arc::new(Self {
            running_config: Mutex::new(config.to_string()),
            fail_fetch: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
            fetch_count: AtomicUsize::new(0),
            push_count: AtomicUsize::new(0),
        })
    }

    fn fail_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    fn fail_push(&self) {
        self.fail_push.store(true, Ordering::SeqCst);
    }

    fn pushes(&self) -> usize {
        self.push_count.load(Ordering::SeqCst)
    }

    async fn current_config(&self) -> String {
        self.running_config.lock().await.clone()
    }
}

#[async_trait]
impl ConfigTransport for MockTransport {
    async fn fetch_configuration(&self, params: &ConnectionParams) -> Result<String> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(NetopsError::ConnectionFailure {
                device: params.credentials.hostname.clone(),
                reason: "simulated fetch failure".to_string(),
            });
        }
        Ok(self.running_config.lock().await.clone())
    }

    async fn push_configuration(
        &self,
        params: &ConnectionParams,
        lines: &[String],
    ) -> Result<usize> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(NetopsError::ConfigPushRejected {
                device: params.credentials.hostname.clone(),
                line: lines.first().cloned().unwrap_or_default(),
                message: "simulated rejection".to_string(),
            });
        }
        self.push_count.fetch_add(1, Ordering::SeqCst);
        *self.running_config.lock().await = lines.join("\n");
        Ok(lines.len())
    }

    async fn check_alive(&self, _params: &ConnectionParams) -> Result<u64> {
        Ok(5)
    }
}

fn params() -> ConnectionParams {
    let credentials = ResolvedCredentials {
        hostname: "192.0.2.10".to_string(),
        port: 22,
        username: "netadmin".to_string(),
        password: SecretString::from("pw".to_string()),
        enable_password: None,
        platform: "cisco_iosxe".to_string(),
    };
    ConnectionParams::new(credentials, Some(Brand::Cisco), None)
}

fn request(device_id: Uuid, target_snapshot_id: Uuid) -> RollbackRequest {
    RollbackRequest {
        device_id,
        original_operation_id: Uuid::new_v4(),
        target_snapshot_id,
        executed_by: "oncall".to_string(),
    }
}

async fn seed_target(
    store: &MemorySnapshotStore,
    device_id: Uuid,
    content: &str,
) -> ConfigSnapshot {
    let snapshot = ConfigSnapshot::capture(
        device_id,
        SnapshotType::Backup,
        content.to_string(),
        None,
    );
    store.create_snapshot(snapshot.clone()).await.expect("seed");
    snapshot
}

#[tokio::test]
async fn backup_creates_checksummed_snapshot_and_auto_diff() {
    let transport = MockTransport::new("hostname sw1\ninterface Gi0/1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();

    let first = engine
        .backup(device_id, &params(), &BackupOptions::default())
        .await
        .expect("first backup");
    assert_eq!(
        first.snapshot.checksum,
        checksum_of(&first.snapshot.config_content)
    );
    assert!(first.diff_against_previous.is_none());

    *transport.running_config.lock().await =
        "hostname sw1\ninterface Gi0/1\ninterface Gi0/2\n".to_string();

    let second = engine
        .backup(device_id, &params(), &BackupOptions::default())
        .await
        .expect("second backup");
    let diff = second.diff_against_previous.expect("auto compare");
    assert_eq!(diff.added_lines, 1);
    assert_eq!(diff.removed_lines, 0);
    assert_eq!(diff.before_snapshot, first.snapshot.id);
    assert_eq!(diff.after_snapshot, second.snapshot.id);

    // The auto-computed diff is cached in the store.
    let cached = store
        .find_diff(first.snapshot.id, second.snapshot.id)
        .await
        .expect("find")
        .expect("cached");
    assert_eq!(cached.diff_content, diff.diff_content);
}

#[tokio::test]
async fn rollback_pushes_target_and_succeeds() {
    let transport = MockTransport::new("hostname sw1\nbroken config\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "hostname sw1\ngood config\n").await;

    let operation = engine
        .rollback(
            request(device_id, target.id),
            &params(),
            &RollbackOptions::default(),
        )
        .await
        .expect("rollback");

    assert_eq!(operation.status, RollbackStatus::Succeeded);
    assert!(operation.error.is_none());
    assert_eq!(operation.validated, Some(true));
    assert!(operation.backup_snapshot_id.is_some());
    assert_eq!(transport.pushes(), 1);
    assert_eq!(
        transport.current_config().await,
        "hostname sw1\ngood config"
    );

    // The pre-rollback snapshot holds the broken config.
    let backup = store
        .get_snapshot(operation.backup_snapshot_id.expect("backup id"))
        .await
        .expect("backup snapshot");
    assert_eq!(backup.config_content, "hostname sw1\nbroken config\n");
}

#[tokio::test]
async fn backup_failure_without_force_never_pushes() {
    let transport = MockTransport::new("whatever\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "hostname sw1\n").await;

    transport.fail_fetch();

    let operation = engine
        .rollback(
            request(device_id, target.id),
            &params(),
            &RollbackOptions::default(),
        )
        .await
        .expect("rollback record");

    assert_eq!(operation.status, RollbackStatus::Failed);
    assert!(
        operation
            .error
            .as_deref()
            .is_some_and(|e| e.contains("pre-rollback backup failed"))
    );
    // The target configuration was never pushed to the device.
    assert_eq!(transport.pushes(), 0);
}

#[tokio::test]
async fn backup_failure_with_force_still_rolls_back() {
    let transport = MockTransport::new("whatever\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "hostname sw1\n").await;

    transport.fail_fetch();

    let options = RollbackOptions {
        force_rollback: true,
        // Validation re-fetches the config, which is scripted to fail here.
        validate_after_rollback: false,
        ..Default::default()
    };
    let operation = engine
        .rollback(request(device_id, target.id), &params(), &options)
        .await
        .expect("rollback record");

    assert_eq!(operation.status, RollbackStatus::Succeeded);
    assert!(operation.backup_snapshot_id.is_none());
    assert_eq!(transport.pushes(), 1);
}

#[tokio::test]
async fn push_failure_reaches_failed_state() {
    let transport = MockTransport::new("hostname sw1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "hostname sw1\n").await;

    transport.fail_push();

    let options = RollbackOptions {
        create_backup: false,
        ..Default::default()
    };
    let operation = engine
        .rollback(request(device_id, target.id), &params(), &options)
        .await
        .expect("rollback record");

    assert_eq!(operation.status, RollbackStatus::Failed);
    assert!(
        operation
            .error
            .as_deref()
            .is_some_and(|e| e.contains("config push failed"))
    );
    assert!(operation.validated.is_none());
}

#[tokio::test]
async fn dry_run_never_touches_the_device() {
    let transport = MockTransport::new("hostname sw1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "hostname sw1\n").await;

    let options = RollbackOptions {
        dry_run: true,
        ..Default::default()
    };
    let operation = engine
        .rollback(request(device_id, target.id), &params(), &options)
        .await
        .expect("dry run");

    assert_eq!(operation.status, RollbackStatus::Succeeded);
    assert_eq!(transport.pushes(), 0);
    assert_eq!(transport.fetch_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sequential_batch_aborts_after_failure_when_asked() {
    let transport = MockTransport::new("hostname sw1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target_a = seed_target(&store, device_id, "config a\n").await;
    let target_b = seed_target(&store, device_id, "config b\n").await;

    transport.fail_push();

    let options = RollbackOptions {
        create_backup: false,
        ..Default::default()
    };
    let batch = BatchOptions {
        continue_on_error: false,
        ..Default::default()
    };
    let report = engine
        .rollback_batch(
            vec![
                (request(device_id, target_a.id), params()),
                (request(device_id, target_b.id), params()),
            ],
            &options,
            &batch,
        )
        .await;

    assert_eq!(report.total, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.operations.len(), 1);
}

#[tokio::test]
async fn parallel_batch_returns_partial_results() {
    let transport = MockTransport::new("hostname sw1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target_a = seed_target(&store, device_id, "config a\n").await;
    let target_b = seed_target(&store, device_id, "config b\n").await;
    // A request whose target snapshot does not exist yields an error entry.
    let missing = Uuid::new_v4();

    let options = RollbackOptions {
        create_backup: false,
        validate_after_rollback: false,
        ..Default::default()
    };
    let batch = BatchOptions {
        parallelism: Some(2),
        continue_on_error: true,
        ..Default::default()
    };
    let report = engine
        .rollback_batch(
            vec![
                (request(device_id, target_a.id), params()),
                (request(device_id, missing), params()),
                (request(device_id, target_b.id), params()),
            ],
            &options,
            &batch,
        )
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].error.contains("not found"));
    assert!(!report.cancelled);
}

#[tokio::test]
async fn cancelled_batch_issues_no_new_rollbacks() {
    let transport = MockTransport::new("hostname sw1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "config a\n").await;

    let batch = BatchOptions::default();
    batch.cancel.cancel();

    let report = engine
        .rollback_batch(
            vec![(request(device_id, target.id), params())],
            &RollbackOptions::default(),
            &batch,
        )
        .await;

    assert!(report.cancelled);
    assert_eq!(report.skipped, 1);
    assert!(report.operations.is_empty());
    assert_eq!(transport.pushes(), 0);
}

#[tokio::test]
async fn rollback_history_is_newest_first() {
    let transport = MockTransport::new("hostname sw1\n");
    let store = Arc::new(MemorySnapshotStore::new());
    let engine = RollbackEngine::new(transport.clone(), store.clone());
    let device_id = Uuid::new_v4();
    let target = seed_target(&store, device_id, "config a\n").await;

    let options = RollbackOptions {
        create_backup: false,
        validate_after_rollback: false,
        ..Default::default()
    };
    let first = engine
        .rollback(request(device_id, target.id), &params(), &options)
        .await
        .expect("first");
    let second = engine
        .rollback(request(device_id, target.id), &params(), &options)
        .await
        .expect("second");

    let history = engine
        .rollback_history(device_id, None)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);

    let limited = engine
        .rollback_history(device_id, Some(1))
        .await
        .expect("limited");
    assert_eq!(limited.len(), 1);
}
