//! # rnetops - Multi-Vendor Network Device Automation Core
//!
//! `rnetops` automates command execution against heterogeneous network
//! devices (switches and routers from multiple vendors) over interactive SSH
//! sessions, turns unstructured CLI text into structured data, and tracks
//! configuration state over time to support safe rollback.
//!
//! ## Features
//!
//! - **Credential Resolution**: per-field priority chains over request,
//!   device, and region sources; single-use one-time-password caching;
//!   passwords encrypted at rest with legacy-tolerant decoding
//! - **Bounded Sessions**: a process-wide session pool (default 50) whose
//!   slots are released on every exit path, including cancellation
//! - **Vendor Adaptation**: Cisco/Huawei/H3C driver profiles selected by a
//!   pure mapping, with a generic fallback for unknown platforms
//! - **Parser Chain**: extraction templates, then table-driven TextFSM
//!   parsing, then raw passthrough — parse failures never lose output
//! - **Snapshot / Diff / Rollback**: checksummed configuration snapshots,
//!   deterministic unified diffs, and a validated rollback state machine
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rnetops::brand::HostFacts;
//! use rnetops::credentials::{CredentialResolver, UserCredentials};
//! use rnetops::device::DeviceRecord;
//! use rnetops::rollback::{BackupOptions, RollbackEngine};
//! use rnetops::session::{ConnectionParams, MANAGER};
//! use rnetops::snapshot::MemorySnapshotStore;
//! use secrecy::SecretString;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Device records come from your data store.
//!     let device: DeviceRecord = serde_json::from_str(
//!         r#"{
//!             "id": "6f65c9f4-3b2a-4f49-9d3b-0c6ad51f2a11",
//!             "name": "sw-core-01",
//!             "ip_address": "10.1.1.1",
//!             "platform": "cisco_iosxe",
//!             "device_type": "switch",
//!             "uses_otp": true,
//!             "region": {"name": "lab", "default_cli_username": "netops"}
//!         }"#,
//!     )?;
//!
//!     let resolver = CredentialResolver::new(SecretString::from("master-key".to_string()));
//!     let credentials =
//!         resolver.resolve(&device, Some(&UserCredentials::password_only("123456")))?;
//!
//!     let (brand, _confidence) = rnetops::brand::detect(&HostFacts::from(&device), None);
//!     let params = ConnectionParams::new(credentials, brand, Some(device.id));
//!
//!     // Execute a command with structured parsing.
//!     let result = MANAGER.execute_with_parsing(&params, "show version").await;
//!     println!(
//!         "{}: {} records in {}ms",
//!         result.device,
//!         result.parsed_data.len(),
//!         result.elapsed_ms
//!     );
//!
//!     // Snapshot the running configuration.
//!     let engine = RollbackEngine::new(
//!         Arc::new(MANAGER.clone()),
//!         Arc::new(MemorySnapshotStore::new()),
//!     );
//!     let report = engine
//!         .backup(device.id, &params, &BackupOptions::default())
//!         .await?;
//!     println!("snapshot {} ({})", report.snapshot.id, report.snapshot.checksum);
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`credentials::CredentialResolver`] - derives connection credentials
//! - [`brand`] - vendor detection with confidence scoring
//! - [`parser`] - the template/fallback parsing chain
//! - [`session::SessionManager`] - pool-bounded sessions (singleton via
//!   [`session::MANAGER`])
//! - [`rollback::RollbackEngine`] - backup, diff, and rollback workflows
//! - [`snapshot::SnapshotStore`] - the persistence contract
//! - [`error::NetopsError`] - the error taxonomy

pub mod brand;
pub mod config;
pub mod credentials;
pub mod device;
pub mod error;
pub mod parser;
pub mod rollback;
pub mod secrets;
pub mod session;
pub mod snapshot;
