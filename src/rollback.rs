//! Config backup and rollback workflows.
//!
//! A rollback operation moves through `pending → in_progress →
//! {succeeded | failed}`; no transition skips `in_progress` and the terminal
//! states are immutable. Pushing a snapshot back assumes the device treats
//! configuration as idempotent overwrite, not incremental change.
//!
//! The engine drives two seams: [`ConfigTransport`] for device I/O and
//! [`SnapshotStore`] for persistence, so workflows are testable end to end
//! without a live device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::{NetopsError, Result};
use crate::parser::format::MAX_REPORTED_ERRORS;
use crate::session::{ConfigTransport, ConnectionParams};
use crate::snapshot::{
    ConfigDiff, ConfigSnapshot, DiffOptions, SnapshotStore, SnapshotType, compare_snapshots,
};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Rollback operation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl RollbackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RollbackStatus::Succeeded | RollbackStatus::Failed)
    }

    /// Legal transitions of the state machine.
    pub fn can_transition_to(self, next: RollbackStatus) -> bool {
        matches!(
            (self, next),
            (RollbackStatus::Pending, RollbackStatus::InProgress)
                | (RollbackStatus::InProgress, RollbackStatus::Succeeded)
                | (RollbackStatus::InProgress, RollbackStatus::Failed)
        )
    }
}

/// Inputs identifying one rollback.
#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub device_id: Uuid,
    /// Operation log entry being rolled back.
    pub original_operation_id: Uuid,
    pub target_snapshot_id: Uuid,
    pub executed_by: String,
}

/// Record of one rollback workflow. Terminal states are immutable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RollbackOperation {
    pub id: Uuid,
    pub device_id: Uuid,
    pub original_operation_id: Uuid,
    pub target_snapshot_id: Uuid,
    pub executed_by: String,
    pub executed_at_ms: u64,
    pub status: RollbackStatus,
    pub error: Option<String>,
    /// Pre-rollback snapshot, when one was captured.
    pub backup_snapshot_id: Option<Uuid>,
    /// Post-rollback validation outcome, when validation ran.
    pub validated: Option<bool>,
    pub elapsed_ms: Option<u64>,
}

impl RollbackOperation {
    pub fn new(request: &RollbackRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: request.device_id,
            original_operation_id: request.original_operation_id,
            target_snapshot_id: request.target_snapshot_id,
            executed_by: request.executed_by.clone(),
            executed_at_ms: now_ms(),
            status: RollbackStatus::Pending,
            error: None,
            backup_snapshot_id: None,
            validated: None,
            elapsed_ms: None,
        }
    }

    /// Applies a state transition, rejecting illegal ones.
    pub fn transition(&mut self, next: RollbackStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(NetopsError::InvalidOperation(format!(
                "illegal rollback transition {:?} -> {next:?}",
                self.status
            )));
        }
        info!("rollback {} transition {:?} -> {next:?}", self.id, self.status);
        self.status = next;
        Ok(())
    }
}

/// Options for [`RollbackEngine::backup`].
#[derive(Debug, Clone, Copy)]
pub struct BackupOptions {
    pub snapshot_type: SnapshotType,
    /// Diff the new snapshot against the device's most recent one.
    pub auto_compare: bool,
    pub operation_id: Option<Uuid>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            snapshot_type: SnapshotType::Backup,
            auto_compare: true,
            operation_id: None,
        }
    }
}

/// Result of a backup run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackupReport {
    pub snapshot: ConfigSnapshot,
    pub diff_against_previous: Option<ConfigDiff>,
    pub elapsed_ms: u64,
}

/// Options for [`RollbackEngine::rollback`].
#[derive(Debug, Clone, Copy)]
pub struct RollbackOptions {
    /// Capture a pre-rollback snapshot first.
    pub create_backup: bool,
    /// Re-check connectivity and config integrity after the push.
    pub validate_after_rollback: bool,
    /// Proceed even when the pre-rollback backup fails.
    pub force_rollback: bool,
    /// Plan only; the device is never touched.
    pub dry_run: bool,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            validate_after_rollback: true,
            force_rollback: false,
            dry_run: false,
        }
    }
}

/// Cooperative cancellation for batch workflows. Cancelling stops new device
/// sessions from being issued; in-flight sessions run to their own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for [`RollbackEngine::rollback_batch`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// `None` (or 0/1) runs sequentially; otherwise bounded parallelism.
    pub parallelism: Option<usize>,
    /// Whether one failure aborts the remaining batch.
    pub continue_on_error: bool,
    pub cancel: CancelFlag,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallelism: None,
            continue_on_error: true,
            cancel: CancelFlag::new(),
        }
    }
}

/// One reported batch failure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RollbackErrorDetail {
    pub device_id: Uuid,
    pub error: String,
}

/// Partial-success report of a batch rollback.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchRollbackReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Requests never started (abort or cancellation).
    pub skipped: usize,
    pub cancelled: bool,
    pub operations: Vec<RollbackOperation>,
    /// First [`MAX_REPORTED_ERRORS`] error details.
    pub errors: Vec<RollbackErrorDetail>,
}

/// Drives backup, compare, and rollback workflows over the transport and
/// store seams.
#[derive(Clone)]
pub struct RollbackEngine {
    transport: Arc<dyn ConfigTransport>,
    store: Arc<dyn SnapshotStore>,
}

impl RollbackEngine {
    pub fn new(transport: Arc<dyn ConfigTransport>, store: Arc<dyn SnapshotStore>) -> Self {
        Self { transport, store }
    }

    /// Captures the device's configuration as a new snapshot, optionally
    /// diffing it against the most recent prior snapshot.
    pub async fn backup(
        &self,
        device_id: Uuid,
        params: &ConnectionParams,
        options: &BackupOptions,
    ) -> Result<BackupReport> {
        let started = Instant::now();
        info!("config backup started for device {device_id}");

        let content = self.transport.fetch_configuration(params).await?;
        let previous = self
            .store
            .snapshots_for_device(device_id, Some(1))
            .await?
            .into_iter()
            .next();

        let snapshot = ConfigSnapshot::capture(
            device_id,
            options.snapshot_type,
            content,
            options.operation_id,
        );
        self.store.create_snapshot(snapshot.clone()).await?;

        let diff_against_previous = match previous {
            Some(previous) if options.auto_compare => {
                let diff = compare_snapshots(&previous, &snapshot, DiffOptions::default())?;
                self.store.create_diff(diff.clone()).await?;
                Some(diff)
            }
            _ => None,
        };

        info!(
            "config backup finished for device {device_id}: snapshot {} ({} bytes)",
            snapshot.id,
            snapshot.config_size()
        );
        Ok(BackupReport {
            snapshot,
            diff_against_previous,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Diff between two stored snapshots. With default options the result is
    /// cached in the store and reused on recomputation.
    pub async fn compare(
        &self,
        before_id: Uuid,
        after_id: Uuid,
        options: DiffOptions,
    ) -> Result<ConfigDiff> {
        let default_options = options == DiffOptions::default();
        if default_options
            && let Some(cached) = self.store.find_diff(before_id, after_id).await?
        {
            return Ok(cached);
        }

        let before = self.store.get_snapshot(before_id).await?;
        let after = self.store.get_snapshot(after_id).await?;
        let diff = compare_snapshots(&before, &after, options)?;

        if default_options {
            self.store.create_diff(diff.clone()).await?;
        }
        Ok(diff)
    }

    /// Runs one rollback workflow to a terminal state.
    ///
    /// The returned operation is `succeeded` or `failed`; workflow-level
    /// problems (backup failure without `force_rollback`, push rejection,
    /// validation failure) are captured in the record rather than returned
    /// as errors. `Err` is reserved for store/contract violations.
    pub async fn rollback(
        &self,
        request: RollbackRequest,
        params: &ConnectionParams,
        options: &RollbackOptions,
    ) -> Result<RollbackOperation> {
        let started = Instant::now();
        let target = self.store.get_snapshot(request.target_snapshot_id).await?;
        if target.device_id != request.device_id {
            return Err(NetopsError::InvalidOperation(
                "target snapshot belongs to a different device".to_string(),
            ));
        }

        let mut operation = RollbackOperation::new(&request);
        self.store.create_rollback(operation.clone()).await?;
        info!(
            "rollback {} created for device {} targeting snapshot {} by {}",
            operation.id, request.device_id, target.id, operation.executed_by
        );

        operation.transition(RollbackStatus::InProgress)?;
        self.store.update_rollback(operation.clone()).await?;

        if options.dry_run {
            info!(
                "rollback {} dry run: {} config lines would be pushed",
                operation.id,
                target.line_count()
            );
            operation.transition(RollbackStatus::Succeeded)?;
            operation.elapsed_ms = Some(started.elapsed().as_millis() as u64);
            self.store.update_rollback(operation.clone()).await?;
            return Ok(operation);
        }

        if options.create_backup {
            let backup_options = BackupOptions {
                snapshot_type: SnapshotType::PreChange,
                auto_compare: false,
                operation_id: Some(operation.id),
            };
            match self.backup(request.device_id, params, &backup_options).await {
                Ok(report) => operation.backup_snapshot_id = Some(report.snapshot.id),
                Err(err) => {
                    warn!(
                        "pre-rollback backup failed for device {}: {err}",
                        request.device_id
                    );
                    if !options.force_rollback {
                        // The target is never pushed in this case.
                        return self
                            .fail(operation, format!("pre-rollback backup failed: {err}"), started)
                            .await;
                    }
                }
            }
        }

        let lines: Vec<String> = target.config_content.lines().map(str::to_string).collect();
        match self.transport.push_configuration(params, &lines).await {
            Ok(applied) => info!(
                "rollback {}: pushed {applied} config lines to device {}",
                operation.id, request.device_id
            ),
            Err(err) => {
                return self
                    .fail(operation, format!("config push failed: {err}"), started)
                    .await;
            }
        }

        if options.validate_after_rollback {
            match self.validate(params, &target).await {
                Ok(()) => operation.validated = Some(true),
                Err(err) => {
                    operation.validated = Some(false);
                    return self
                        .fail(
                            operation,
                            format!("post-rollback validation failed: {err}"),
                            started,
                        )
                        .await;
                }
            }
        }

        operation.transition(RollbackStatus::Succeeded)?;
        operation.elapsed_ms = Some(started.elapsed().as_millis() as u64);
        self.store.update_rollback(operation.clone()).await?;
        info!(
            "rollback {} succeeded for device {}",
            operation.id, request.device_id
        );
        Ok(operation)
    }

    async fn fail(
        &self,
        mut operation: RollbackOperation,
        reason: String,
        started: Instant,
    ) -> Result<RollbackOperation> {
        warn!("rollback {} failed: {reason}", operation.id);
        operation.transition(RollbackStatus::Failed)?;
        operation.error = Some(reason);
        operation.elapsed_ms = Some(started.elapsed().as_millis() as u64);
        self.store.update_rollback(operation.clone()).await?;
        Ok(operation)
    }

    /// Connectivity and config-integrity check after a push.
    async fn validate(&self, params: &ConnectionParams, target: &ConfigSnapshot) -> Result<()> {
        let response_ms = self.transport.check_alive(params).await?;
        let fetched = self.transport.fetch_configuration(params).await?;
        if fetched.trim().is_empty() {
            return Err(NetopsError::RollbackFailure(
                "device returned an empty configuration after rollback".to_string(),
            ));
        }
        debug!(
            "post-rollback validation passed in {response_ms}ms ({} bytes fetched, target {} bytes)",
            fetched.len(),
            target.config_size()
        );
        Ok(())
    }

    /// Processes multiple rollbacks sequentially or with bounded parallelism.
    ///
    /// Cancelling the batch stops issuing new rollbacks; in-flight ones run
    /// to completion. Partial results are always returned.
    pub async fn rollback_batch(
        &self,
        requests: Vec<(RollbackRequest, ConnectionParams)>,
        options: &RollbackOptions,
        batch: &BatchOptions,
    ) -> BatchRollbackReport {
        let total = requests.len();
        let mut operations: Vec<RollbackOperation> = Vec::new();
        let mut errors: Vec<RollbackErrorDetail> = Vec::new();
        let mut error_count = 0usize;

        match batch.parallelism {
            None | Some(0) | Some(1) => {
                for (request, params) in requests {
                    if batch.cancel.is_cancelled() {
                        break;
                    }
                    let device_id = request.device_id;
                    match self.rollback(request, &params, options).await {
                        Ok(operation) => {
                            let failed = operation.status == RollbackStatus::Failed;
                            operations.push(operation);
                            if failed && !batch.continue_on_error {
                                break;
                            }
                        }
                        Err(err) => {
                            error_count += 1;
                            errors.push(RollbackErrorDetail {
                                device_id,
                                error: err.to_string(),
                            });
                            if !batch.continue_on_error {
                                break;
                            }
                        }
                    }
                }
            }
            Some(parallelism) => {
                let gate = Arc::new(Semaphore::new(parallelism));
                let mut join_set: JoinSet<(usize, Uuid, Option<Result<RollbackOperation>>)> =
                    JoinSet::new();

                for (index, (request, params)) in requests.into_iter().enumerate() {
                    let engine = self.clone();
                    let options = *options;
                    let gate = gate.clone();
                    let cancel = batch.cancel.clone();
                    join_set.spawn(async move {
                        let device_id = request.device_id;
                        let _permit = match gate.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => return (index, device_id, None),
                        };
                        if cancel.is_cancelled() {
                            return (index, device_id, None);
                        }
                        let outcome = engine.rollback(request, &params, &options).await;
                        (index, device_id, Some(outcome))
                    });
                }

                let mut indexed = Vec::new();
                while let Some(joined) = join_set.join_next().await {
                    match joined {
                        Ok(entry) => {
                            let failed = match &entry.2 {
                                Some(Ok(op)) => op.status == RollbackStatus::Failed,
                                Some(Err(_)) => true,
                                None => false,
                            };
                            if failed && !batch.continue_on_error {
                                batch.cancel.cancel();
                            }
                            indexed.push(entry);
                        }
                        Err(join_err) => warn!("rollback batch task panicked: {join_err}"),
                    }
                }

                indexed.sort_by_key(|(index, _, _)| *index);
                for (_, device_id, outcome) in indexed {
                    match outcome {
                        Some(Ok(operation)) => operations.push(operation),
                        Some(Err(err)) => {
                            error_count += 1;
                            errors.push(RollbackErrorDetail {
                                device_id,
                                error: err.to_string(),
                            });
                        }
                        None => {}
                    }
                }
            }
        }

        let succeeded = operations
            .iter()
            .filter(|op| op.status == RollbackStatus::Succeeded)
            .count();
        let failed = operations
            .iter()
            .filter(|op| op.status == RollbackStatus::Failed)
            .count()
            + error_count;
        let skipped = total - operations.len() - error_count;
        errors.truncate(MAX_REPORTED_ERRORS);

        BatchRollbackReport {
            total,
            succeeded,
            failed,
            skipped,
            cancelled: batch.cancel.is_cancelled(),
            operations,
            errors,
        }
    }

    /// Rollback history for a device, newest first.
    pub async fn rollback_history(
        &self,
        device_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<RollbackOperation>> {
        self.store.rollbacks_for_device(device_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RollbackRequest {
        RollbackRequest {
            device_id: Uuid::new_v4(),
            original_operation_id: Uuid::new_v4(),
            target_snapshot_id: Uuid::new_v4(),
            executed_by: "oncall".to_string(),
        }
    }

    #[test]
    fn new_operation_starts_pending() {
        let operation = RollbackOperation::new(&request());
        assert_eq!(operation.status, RollbackStatus::Pending);
        assert!(!operation.status.is_terminal());
    }

    #[test]
    fn no_transition_skips_in_progress() {
        let mut operation = RollbackOperation::new(&request());
        let err = operation
            .transition(RollbackStatus::Succeeded)
            .expect_err("must pass through in_progress");
        assert!(matches!(err, NetopsError::InvalidOperation(_)));

        operation.transition(RollbackStatus::InProgress).expect("legal");
        operation.transition(RollbackStatus::Succeeded).expect("legal");
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut operation = RollbackOperation::new(&request());
        operation.transition(RollbackStatus::InProgress).expect("legal");
        operation.transition(RollbackStatus::Failed).expect("legal");
        assert!(operation.status.is_terminal());

        for next in [
            RollbackStatus::Pending,
            RollbackStatus::InProgress,
            RollbackStatus::Succeeded,
            RollbackStatus::Failed,
        ] {
            assert!(operation.transition(next).is_err());
        }
    }

    #[test]
    fn cancel_flag_is_sticky_and_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
