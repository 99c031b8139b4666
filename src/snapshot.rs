//! Configuration snapshots, diffs, and the persistence contract.
//!
//! A snapshot is an immutable, checksummed capture of a device's full
//! configuration. Diffs between two snapshots are deterministic: the same
//! snapshot pair and option set always yields byte-identical diff text.
//! Records are handed to the embedding application through the
//! [`SnapshotStore`] contract; [`MemorySnapshotStore`] is the bundled
//! in-memory implementation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::RegexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{NetopsError, Result};
use crate::rollback::RollbackOperation;

/// How many snapshots the in-memory store keeps per device.
pub const SNAPSHOT_RETENTION: usize = 50;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotType {
    Backup,
    PreChange,
    PostChange,
}

/// SHA-256 hex digest of configuration content.
pub fn checksum_of(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// A captured, checksummed device configuration. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigSnapshot {
    pub id: Uuid,
    pub device_id: Uuid,
    pub snapshot_type: SnapshotType,
    pub config_content: String,
    /// Always `checksum_of(config_content)`; re-verified at read time.
    pub checksum: String,
    /// Operation that triggered the capture, when there is one.
    pub operation_id: Option<Uuid>,
    pub created_at_ms: u64,
}

impl ConfigSnapshot {
    /// Captures a snapshot of `content`, computing its checksum.
    pub fn capture(
        device_id: Uuid,
        snapshot_type: SnapshotType,
        content: String,
        operation_id: Option<Uuid>,
    ) -> Self {
        let checksum = checksum_of(&content);
        Self {
            id: Uuid::new_v4(),
            device_id,
            snapshot_type,
            config_content: content,
            checksum,
            operation_id,
            created_at_ms: now_ms(),
        }
    }

    /// Verifies the content still hashes to the stored checksum.
    pub fn verify_integrity(&self) -> Result<()> {
        let computed = checksum_of(&self.config_content);
        if computed != self.checksum {
            return Err(NetopsError::SnapshotIntegrity {
                id: self.id,
                stored: self.checksum.clone(),
                computed,
            });
        }
        Ok(())
    }

    pub fn config_size(&self) -> usize {
        self.config_content.len()
    }

    pub fn line_count(&self) -> usize {
        self.config_content.lines().count()
    }

    fn display_name(&self) -> String {
        let id = self.id.to_string();
        format!("snapshot {} ({:?})", &id[..8], self.snapshot_type)
    }
}

/// Diff computation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Unchanged lines shown around each change.
    pub context_lines: usize,
    /// Drop blank lines before comparing.
    pub ignore_blank_lines: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            context_lines: 3,
            ignore_blank_lines: true,
        }
    }
}

/// Overall risk of a configuration change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
}

/// Classification of changed lines against known-sensitive config areas.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub critical_changes: usize,
    pub categories: BTreeMap<String, usize>,
}

/// Computed difference between two snapshots. Derived and recomputable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigDiff {
    pub before_snapshot: Uuid,
    pub after_snapshot: Uuid,
    /// Unified-diff text.
    pub diff_content: String,
    pub added_lines: usize,
    pub removed_lines: usize,
    /// Percentage of lines common to both sides, rounded to 2 decimals.
    pub similarity_pct: f64,
    pub risk: RiskAssessment,
}

#[derive(Clone, Copy)]
enum Edit<'a> {
    Equal(&'a str),
    Delete(&'a str),
    Insert(&'a str),
}

/// Myers shortest-edit-script diff over lines.
fn diff_lines<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<Edit<'a>> {
    let n = a.len();
    let m = b.len();
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max as isize;
    let width = 2 * max + 1;
    let mut v = vec![0usize; width];
    let mut trace: Vec<Vec<usize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v.clone());
        let d_i = d as isize;
        let mut k = -d_i;
        while k <= d_i {
            let idx = (k + offset) as usize;
            let mut x = if k == -d_i || (k != d_i && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            while x < n && y < m && a[x] == b[y] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    // Backtrack from (n, m) through the recorded depth states.
    let mut edits = Vec::new();
    let mut x = n as isize;
    let mut y = m as isize;
    for (d, v) in trace.iter().enumerate().rev() {
        if x == 0 && y == 0 {
            break;
        }
        let d_i = d as isize;
        let k = x - y;
        let prev_k = if k == -d_i || (k != d_i && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize] as isize;
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            edits.push(Edit::Equal(a[(x - 1) as usize]));
            x -= 1;
            y -= 1;
        }

        if d > 0 {
            if x == prev_x {
                edits.push(Edit::Insert(b[(y - 1) as usize]));
                y -= 1;
            } else {
                edits.push(Edit::Delete(a[(x - 1) as usize]));
                x -= 1;
            }
        }
    }
    edits.reverse();
    edits
}

struct DiffRow<'a> {
    tag: char,
    a_cursor: usize,
    b_cursor: usize,
    text: &'a str,
}

fn build_unified_diff(
    edits: &[Edit<'_>],
    before_name: &str,
    after_name: &str,
    context: usize,
) -> (String, usize, usize) {
    let mut rows = Vec::with_capacity(edits.len());
    let mut a_cursor = 0usize;
    let mut b_cursor = 0usize;
    let mut added = 0usize;
    let mut removed = 0usize;

    for edit in edits.iter().copied() {
        match edit {
            Edit::Equal(text) => {
                rows.push(DiffRow {
                    tag: ' ',
                    a_cursor,
                    b_cursor,
                    text,
                });
                a_cursor += 1;
                b_cursor += 1;
            }
            Edit::Delete(text) => {
                rows.push(DiffRow {
                    tag: '-',
                    a_cursor,
                    b_cursor,
                    text,
                });
                a_cursor += 1;
                removed += 1;
            }
            Edit::Insert(text) => {
                rows.push(DiffRow {
                    tag: '+',
                    a_cursor,
                    b_cursor,
                    text,
                });
                b_cursor += 1;
                added += 1;
            }
        }
    }

    if added == 0 && removed == 0 {
        return (String::new(), 0, 0);
    }

    // Group changed rows into hunks, merging when contexts touch.
    let mut groups: Vec<(usize, usize)> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if row.tag == ' ' {
            continue;
        }
        let start = i.saturating_sub(context);
        let end = (i + context + 1).min(rows.len());
        match groups.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => groups.push((start, end)),
        }
    }

    let mut text = format!("--- {before_name}\n+++ {after_name}\n");
    for (start, end) in groups {
        let hunk = &rows[start..end];
        let a_len = hunk.iter().filter(|r| r.tag != '+').count();
        let b_len = hunk.iter().filter(|r| r.tag != '-').count();
        let a_start = if a_len > 0 { hunk[0].a_cursor + 1 } else { hunk[0].a_cursor };
        let b_start = if b_len > 0 { hunk[0].b_cursor + 1 } else { hunk[0].b_cursor };
        text.push_str(&format!("@@ -{a_start},{a_len} +{b_start},{b_len} @@\n"));
        for row in hunk {
            text.push(row.tag);
            text.push_str(row.text);
            text.push('\n');
        }
    }

    (text, added, removed)
}

struct RiskCategory {
    name: &'static str,
    critical: bool,
    patterns: RegexSet,
}

static RISK_CATEGORIES: Lazy<Vec<RiskCategory>> = Lazy::new(|| {
    vec![
        RiskCategory {
            name: "interface",
            critical: true,
            patterns: RegexSet::new([r"^interface\s", r"^\s+shutdown", r"^\s+no shutdown", r"^\s+ip address"])
                .expect("interface risk patterns"),
        },
        RiskCategory {
            name: "routing",
            critical: true,
            patterns: RegexSet::new([r"^router\s", r"^ip route\s", r"^\s+network\s"])
                .expect("routing risk patterns"),
        },
        RiskCategory {
            name: "access_control",
            critical: true,
            patterns: RegexSet::new([r"^access-list\s", r"^ip access-list", r"^\s+(permit|deny)\s"])
                .expect("acl risk patterns"),
        },
        RiskCategory {
            name: "security",
            critical: true,
            patterns: RegexSet::new([r"^username\s", r"^enable secret", r"^crypto\s", r"^aaa\s"])
                .expect("security risk patterns"),
        },
        RiskCategory {
            name: "vlan",
            critical: false,
            patterns: RegexSet::new([r"^vlan\s", r"^\s+switchport\s"]).expect("vlan risk patterns"),
        },
        RiskCategory {
            name: "snmp",
            critical: false,
            patterns: RegexSet::new([r"^snmp-server\s", r"^snmp\s"]).expect("snmp risk patterns"),
        },
        RiskCategory {
            name: "logging",
            critical: false,
            patterns: RegexSet::new([r"^logging\s"]).expect("logging risk patterns"),
        },
    ]
});

fn assess_risk(edits: &[Edit<'_>]) -> RiskAssessment {
    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    let mut critical_changes = 0usize;
    let mut non_critical_changes = 0usize;

    for edit in edits {
        let text = match edit {
            Edit::Delete(text) | Edit::Insert(text) => *text,
            Edit::Equal(_) => continue,
        };
        for category in RISK_CATEGORIES.iter() {
            if category.patterns.is_match(text) {
                *categories.entry(category.name.to_string()).or_insert(0) += 1;
                if category.critical {
                    critical_changes += 1;
                } else {
                    non_critical_changes += 1;
                }
                break;
            }
        }
    }

    let level = if critical_changes > 0 {
        RiskLevel::High
    } else if non_critical_changes > 5 {
        RiskLevel::Medium
    } else if non_critical_changes > 0 {
        RiskLevel::Low
    } else {
        RiskLevel::Minimal
    };

    RiskAssessment {
        level,
        critical_changes,
        categories,
    }
}

fn preprocess<'a>(content: &'a str, options: &DiffOptions) -> Vec<&'a str> {
    content
        .lines()
        .map(str::trim_end)
        .filter(|line| !options.ignore_blank_lines || !line.is_empty())
        .collect()
}

/// Computes the diff between two snapshots of the same device.
///
/// Both snapshots' checksums are verified first. The computation is
/// deterministic: recomputation for the same pair and options yields an
/// identical diff.
pub fn compare_snapshots(
    before: &ConfigSnapshot,
    after: &ConfigSnapshot,
    options: DiffOptions,
) -> Result<ConfigDiff> {
    if before.device_id != after.device_id {
        return Err(NetopsError::InvalidOperation(
            "cannot diff snapshots of different devices".to_string(),
        ));
    }
    before.verify_integrity()?;
    after.verify_integrity()?;

    let a = preprocess(&before.config_content, &options);
    let b = preprocess(&after.config_content, &options);
    let edits = diff_lines(&a, &b);

    let (diff_content, added_lines, removed_lines) = build_unified_diff(
        &edits,
        &before.display_name(),
        &after.display_name(),
        options.context_lines,
    );

    let equal = edits
        .iter()
        .filter(|e| matches!(e, Edit::Equal(_)))
        .count();
    let denominator = a.len() + b.len();
    let similarity_pct = if denominator == 0 {
        100.0
    } else {
        ((equal * 2) as f64 / denominator as f64 * 10_000.0).round() / 100.0
    };

    Ok(ConfigDiff {
        before_snapshot: before.id,
        after_snapshot: after.id,
        diff_content,
        added_lines,
        removed_lines,
        similarity_pct,
        risk: assess_risk(&edits),
    })
}

/// Create/read persistence contract the embedding application implements.
///
/// The core creates snapshot, diff, and rollback records and reads them back;
/// it assumes nothing about the storage engine behind this trait.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn create_snapshot(&self, snapshot: ConfigSnapshot) -> Result<()>;

    /// Fetches a snapshot, verifying its checksum at read time.
    async fn get_snapshot(&self, id: Uuid) -> Result<ConfigSnapshot>;

    /// Snapshots for a device, newest first.
    async fn snapshots_for_device(
        &self,
        device_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ConfigSnapshot>>;

    async fn create_diff(&self, diff: ConfigDiff) -> Result<()>;

    /// A previously computed diff for an ordered snapshot pair.
    async fn find_diff(&self, before: Uuid, after: Uuid) -> Result<Option<ConfigDiff>>;

    async fn create_rollback(&self, operation: RollbackOperation) -> Result<()>;

    async fn update_rollback(&self, operation: RollbackOperation) -> Result<()>;

    /// Rollback operations for a device, newest first.
    async fn rollbacks_for_device(
        &self,
        device_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<RollbackOperation>>;
}

#[derive(Default)]
struct MemoryStoreInner {
    snapshots: HashMap<Uuid, ConfigSnapshot>,
    by_device: HashMap<Uuid, VecDeque<Uuid>>,
    diffs: HashMap<(Uuid, Uuid), ConfigDiff>,
    rollbacks: HashMap<Uuid, RollbackOperation>,
    rollback_order: Vec<Uuid>,
}

/// In-memory [`SnapshotStore`] with bounded per-device retention.
#[derive(Default)]
pub struct MemorySnapshotStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn create_snapshot(&self, snapshot: ConfigSnapshot) -> Result<()> {
        let mut inner = self.inner.write().await;
        let evicted = {
            let queue = inner.by_device.entry(snapshot.device_id).or_default();
            queue.push_back(snapshot.id);
            if queue.len() > SNAPSHOT_RETENTION {
                queue.pop_front()
            } else {
                None
            }
        };
        if let Some(evicted) = evicted {
            inner.snapshots.remove(&evicted);
        }
        inner.snapshots.insert(snapshot.id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, id: Uuid) -> Result<ConfigSnapshot> {
        let inner = self.inner.read().await;
        let snapshot = inner
            .snapshots
            .get(&id)
            .cloned()
            .ok_or(NetopsError::SnapshotNotFound(id))?;
        snapshot.verify_integrity()?;
        Ok(snapshot)
    }

    async fn snapshots_for_device(
        &self,
        device_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ConfigSnapshot>> {
        let inner = self.inner.read().await;
        let Some(queue) = inner.by_device.get(&device_id) else {
            return Ok(Vec::new());
        };
        let take = limit.unwrap_or(usize::MAX);
        Ok(queue
            .iter()
            .rev()
            .filter_map(|id| inner.snapshots.get(id).cloned())
            .take(take)
            .collect())
    }

    async fn create_diff(&self, diff: ConfigDiff) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .diffs
            .insert((diff.before_snapshot, diff.after_snapshot), diff);
        Ok(())
    }

    async fn find_diff(&self, before: Uuid, after: Uuid) -> Result<Option<ConfigDiff>> {
        let inner = self.inner.read().await;
        Ok(inner.diffs.get(&(before, after)).cloned())
    }

    async fn create_rollback(&self, operation: RollbackOperation) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.rollback_order.push(operation.id);
        inner.rollbacks.insert(operation.id, operation);
        Ok(())
    }

    async fn update_rollback(&self, operation: RollbackOperation) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.rollbacks.contains_key(&operation.id) {
            return Err(NetopsError::Storage(format!(
                "unknown rollback operation {}",
                operation.id
            )));
        }
        inner.rollbacks.insert(operation.id, operation);
        Ok(())
    }

    async fn rollbacks_for_device(
        &self,
        device_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<RollbackOperation>> {
        let inner = self.inner.read().await;
        let take = limit.unwrap_or(usize::MAX);
        Ok(inner
            .rollback_order
            .iter()
            .rev()
            .filter_map(|id| inner.rollbacks.get(id))
            .filter(|op| op.device_id == device_id)
            .take(take)
            .cloned()
            .collect())
    }
}
