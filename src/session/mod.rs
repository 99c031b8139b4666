//! Bounded SSH session management and command execution.
//!
//! A process-wide counting semaphore caps concurrent device sessions; every
//! open session holds an owned permit that is returned on every exit path.
//! Vendor adaptation is a pure mapping from (brand, platform) to a driver
//! profile carrying the prompt, error, and pagination vocabulary for that
//! vendor family.
//!
//! # Main Components
//!
//! - [`SessionManager`] - pool-bounded session opener (singleton via [`MANAGER`])
//! - [`ShellSession`] - one interactive shell over SSH
//! - [`SessionLease`] - an open session plus its pool slot
//! - [`CommandExecutionResult`] - per-command execution record

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use russh::ChannelMsg;
use schemars::JsonSchema;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::brand::{Brand, HostFacts};
use crate::config;
use crate::credentials::ResolvedCredentials;
use crate::error::{NetopsError, Result};
use crate::parser::{self, ParseMethod, ParsedRecord};

pub use driver::{DriverKind, VendorProfile, profile_for, select_driver};
pub use manager::{ConfigTransport, SessionLease, SessionManager, SessionSlot};
pub use shell::ShellSession;

/// Global session manager with the default pool size.
pub static MANAGER: Lazy<SessionManager> = Lazy::new(SessionManager::new);

/// Per-call timeouts. The pool bound itself is a property of the manager.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Per-command send/receive timeout.
    pub socket_timeout: Duration,
    /// Connect + authenticate + first-prompt timeout.
    pub transport_open_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            socket_timeout: config::DEFAULT_SOCKET_TIMEOUT,
            transport_open_timeout: config::DEFAULT_TRANSPORT_OPEN_TIMEOUT,
        }
    }
}

/// Everything needed to reach one device.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub credentials: ResolvedCredentials,
    /// Brand hint driving driver and parser selection.
    pub brand: Option<Brand>,
    pub device_id: Option<Uuid>,
    pub limits: SessionLimits,
}

impl ConnectionParams {
    pub fn new(
        credentials: ResolvedCredentials,
        brand: Option<Brand>,
        device_id: Option<Uuid>,
    ) -> Self {
        Self {
            credentials,
            brand,
            device_id,
            limits: SessionLimits::default(),
        }
    }
}

/// Whether a command reached the device and produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Record of one command invocation. Immutable once returned.
///
/// `status` reflects transport-level success only; a parse failure leaves the
/// raw output in place with `parse_method = raw_only` and the parse error
/// attached.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandExecutionResult {
    pub device: String,
    pub device_id: Option<Uuid>,
    pub command: String,
    pub status: ExecutionStatus,
    pub raw_output: String,
    pub parsed_data: Vec<ParsedRecord>,
    pub parse_method: Option<ParseMethod>,
    pub parse_error: Option<String>,
    /// Measured from the slot-acquisition attempt to result return.
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl CommandExecutionResult {
    fn success(
        params: &ConnectionParams,
        command: &str,
        raw_output: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            device: params.credentials.hostname.clone(),
            device_id: params.device_id,
            command: command.to_string(),
            status: ExecutionStatus::Success,
            raw_output,
            parsed_data: Vec::new(),
            parse_method: None,
            parse_error: None,
            elapsed_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    fn failure(
        params: &ConnectionParams,
        command: &str,
        error: &NetopsError,
        elapsed: Duration,
    ) -> Self {
        Self {
            device: params.credentials.hostname.clone(),
            device_id: params.device_id,
            command: command.to_string(),
            status: ExecutionStatus::Failed,
            raw_output: String::new(),
            parsed_data: Vec::new(),
            parse_method: None,
            parse_error: None,
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(error.to_string()),
        }
    }
}

/// Connectivity probe result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityReport {
    pub hostname: String,
    pub status: ExecutionStatus,
    pub response_time_ms: u64,
    pub driver: DriverKind,
    pub output_bytes: usize,
    pub error: Option<String>,
}

/// Basic device facts gathered over one session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceFacts {
    pub hostname: String,
    pub driver: DriverKind,
    pub version_output: String,
    pub inventory_output: Option<String>,
}

mod driver;
mod manager;
mod shell;
