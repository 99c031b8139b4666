//! Error types for credential resolution, device sessions, parsing, and the
//! snapshot/rollback engine.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetopsError>;

/// Which piece of a credential set could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialGap {
    /// No username from the request, the device record, or the region default.
    Username,
    /// The device uses one-time passwords and none was supplied.
    OtpPassword,
    /// The device uses a fixed password but none is stored or supplied.
    FixedPassword,
}

impl fmt::Display for CredentialGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialGap::Username => {
                write!(f, "no username from request, device, or region default")
            }
            CredentialGap::OtpPassword => {
                write!(f, "device uses one-time passwords; supply one with the request")
            }
            CredentialGap::FixedPassword => {
                write!(f, "no password stored for the device and none supplied")
            }
        }
    }
}

/// Errors produced by the automation core.
#[derive(Error, Debug)]
pub enum NetopsError {
    /// Credential resolution failed for one device. Fatal for that device,
    /// never for a batch.
    #[error("credential unavailable for {device}: {reason}")]
    CredentialUnavailable { device: String, reason: CredentialGap },

    /// A stored secret could not be decoded.
    #[error("secret decode failed: {0}")]
    SecretDecode(String),

    /// The named brand is not in the supported set.
    #[error("unsupported brand: {0}")]
    UnsupportedBrand(String),

    /// No extraction template exists for a (brand, command type) pair.
    /// Recoverable: the parser chain falls back to the next strategy.
    #[error("no parse template for ({brand}, {command_type})")]
    TemplateNotFound { brand: String, command_type: String },

    /// A parsing strategy failed. Recoverable: raw output is preserved.
    #[error("parse failed: {0}")]
    ParseFailure(String),

    /// Transport-level connection failure, recorded per device.
    #[error("connection to {device} failed: {reason}")]
    ConnectionFailure { device: String, reason: String },

    /// The remote device rejected authentication.
    #[error("authentication rejected by {device}")]
    AuthenticationFailure { device: String },

    /// The shell channel closed while waiting on output.
    #[error("shell channel closed by {device}")]
    ChannelClosed { device: String },

    /// A command did not complete within its socket timeout.
    #[error("command timed out on {device} after {elapsed_ms}ms")]
    CommandTimeout { device: String, elapsed_ms: u64 },

    /// Opening the transport exceeded the transport-open timeout.
    #[error("transport open to {device} timed out")]
    TransportOpenTimeout { device: String },

    /// The device flagged a command's output with a vendor error marker.
    #[error("command '{command}' rejected by {device}: {message}")]
    CommandRejected {
        device: String,
        command: String,
        message: String,
    },

    /// The device rejected a configuration line during a push.
    #[error("config push rejected by {device} at line '{line}': {message}")]
    ConfigPushRejected {
        device: String,
        line: String,
        message: String,
    },

    /// A referenced snapshot does not exist in the store.
    #[error("snapshot {0} not found")]
    SnapshotNotFound(Uuid),

    /// A snapshot's content no longer matches its stored checksum.
    #[error("snapshot {id} failed integrity check (stored {stored}, computed {computed})")]
    SnapshotIntegrity {
        id: Uuid,
        stored: String,
        computed: String,
    },

    /// A rollback workflow ended in the `failed` terminal state.
    #[error("rollback failed: {0}")]
    RollbackFailure(String),

    /// The requested operation violates a state-machine or contract rule.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Persistence contract error reported by the embedding store.
    #[error("storage error: {0}")]
    Storage(String),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("ssh client error: {0}")]
    SshClient(#[from] async_ssh2_tokio::Error),
}

impl NetopsError {
    /// True for errors a batch should record per device and continue past
    /// rather than abort on.
    pub fn is_per_device(&self) -> bool {
        matches!(
            self,
            NetopsError::CredentialUnavailable { .. }
                | NetopsError::ConnectionFailure { .. }
                | NetopsError::AuthenticationFailure { .. }
                | NetopsError::ChannelClosed { .. }
                | NetopsError::CommandTimeout { .. }
                | NetopsError::TransportOpenTimeout { .. }
                | NetopsError::CommandRejected { .. }
                | NetopsError::ConfigPushRejected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_gap_messages_are_distinguished() {
        assert_ne!(
            CredentialGap::OtpPassword.to_string(),
            CredentialGap::FixedPassword.to_string()
        );
    }

    #[test]
    fn per_device_classification_covers_connection_errors() {
        let err = NetopsError::ConnectionFailure {
            device: "sw1".to_string(),
            reason: "refused".to_string(),
        };
        assert!(err.is_per_device());

        let err = NetopsError::InvalidOperation("bad transition".to_string());
        assert!(!err.is_per_device());
    }
}
