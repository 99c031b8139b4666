//! Credential resolution for device sessions.
//!
//! Resolution follows a fixed priority chain per field. Username: caller
//! request, then the device's fixed CLI account (non-OTP devices only), then
//! the region default. Password: caller request (cached single-use for OTP
//! devices), then the stored encrypted password. Enable password is optional.
//!
//! The OTP cache is the only secret-bearing shared state in the process:
//! entries are consumed on first use, evicted on a TTL, and zeroed on drop.

use log::{debug, info, warn};
use moka::sync::Cache;
use schemars::JsonSchema;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::device::DeviceRecord;
use crate::error::{CredentialGap, NetopsError, Result};
use crate::secrets;

/// Credentials supplied with a request, all optional.
#[derive(Debug, Default, Clone)]
pub struct UserCredentials {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub enable_password: Option<SecretString>,
}

impl UserCredentials {
    /// Request credentials carrying only a password (the common OTP case).
    pub fn password_only(password: &str) -> Self {
        Self {
            username: None,
            password: Some(SecretString::from(password.to_string())),
            enable_password: None,
        }
    }
}

/// Connection parameters derived for one device at call time.
///
/// Ephemeral: never persisted, and the secret fields redact themselves in
/// `Debug` output.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub enable_password: Option<SecretString>,
    pub platform: String,
}

/// Non-sensitive connection summary for display purposes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionInfo {
    pub hostname: String,
    pub username: Option<String>,
    pub password_type: String,
    pub has_enable_password: bool,
    pub platform: String,
    pub uses_otp: bool,
}

/// Which credential fields a caller must supply for a device.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CredentialRequirements {
    pub requires_username: bool,
    pub requires_password: bool,
    pub requires_enable_password: bool,
    pub uses_otp: bool,
}

/// Resolves effective connection credentials for devices.
pub struct CredentialResolver {
    master_key: SecretString,
    otp_cache: Cache<Uuid, SecretString>,
}

impl CredentialResolver {
    /// Creates a resolver around the process master encryption key.
    pub fn new(master_key: SecretString) -> Self {
        let otp_cache = Cache::builder()
            .max_capacity(1024)
            .time_to_live(config::OTP_CACHE_TTL)
            .build();
        Self {
            master_key,
            otp_cache,
        }
    }

    /// Resolves credentials for `device`, preferring caller-supplied values.
    ///
    /// Emits an audit log entry naming the device on both outcomes; secret
    /// values never reach the log.
    pub fn resolve(
        &self,
        device: &DeviceRecord,
        supplied: Option<&UserCredentials>,
    ) -> Result<ResolvedCredentials> {
        let outcome = self.resolve_inner(device, supplied);
        match &outcome {
            Ok(resolved) => info!(
                "resolved credentials for {} (user {})",
                device.name, resolved.username
            ),
            Err(err) => warn!("credential resolution failed for {}: {err}", device.name),
        }
        outcome
    }

    fn resolve_inner(
        &self,
        device: &DeviceRecord,
        supplied: Option<&UserCredentials>,
    ) -> Result<ResolvedCredentials> {
        let username = self.resolve_username(device, supplied)?;
        let password = self.resolve_password(device, supplied)?;
        let enable_password = self.resolve_enable_password(device, supplied);

        Ok(ResolvedCredentials {
            hostname: device.ip_address.clone(),
            port: device.port,
            username,
            password,
            enable_password,
            platform: device.platform.clone(),
        })
    }

    fn resolve_username(
        &self,
        device: &DeviceRecord,
        supplied: Option<&UserCredentials>,
    ) -> Result<String> {
        if let Some(name) = supplied.and_then(|c| c.username.as_deref())
            && !name.is_empty()
        {
            return Ok(name.to_string());
        }

        if !device.uses_otp
            && let Some(name) = device.cli_username.as_deref()
            && !name.is_empty()
        {
            return Ok(name.to_string());
        }

        if let Some(name) = device.region.default_cli_username.as_deref()
            && !name.is_empty()
        {
            return Ok(name.to_string());
        }

        Err(NetopsError::CredentialUnavailable {
            device: device.name.clone(),
            reason: CredentialGap::Username,
        })
    }

    fn resolve_password(
        &self,
        device: &DeviceRecord,
        supplied: Option<&UserCredentials>,
    ) -> Result<SecretString> {
        if let Some(password) = supplied.and_then(|c| c.password.clone()) {
            if device.uses_otp {
                self.otp_cache.insert(device.id, password.clone());
                debug!("cached one-time password for {}", device.name);
            }
            return Ok(password);
        }

        if !device.uses_otp
            && let Some(stored) = device.cli_password_encrypted.as_deref()
            && !stored.is_empty()
        {
            let plaintext = secrets::decrypt_or_passthrough(stored, &self.master_key, &device.name);
            return Ok(SecretString::from(plaintext));
        }

        if device.uses_otp {
            // A previously submitted OTP may still be waiting; it is removed
            // here so each entry authenticates at most one session.
            if let Some(cached) = self.take_otp(device.id) {
                debug!("consumed cached one-time password for {}", device.name);
                return Ok(cached);
            }
            return Err(NetopsError::CredentialUnavailable {
                device: device.name.clone(),
                reason: CredentialGap::OtpPassword,
            });
        }

        Err(NetopsError::CredentialUnavailable {
            device: device.name.clone(),
            reason: CredentialGap::FixedPassword,
        })
    }

    fn resolve_enable_password(
        &self,
        device: &DeviceRecord,
        supplied: Option<&UserCredentials>,
    ) -> Option<SecretString> {
        if let Some(enable) = supplied.and_then(|c| c.enable_password.clone()) {
            return Some(enable);
        }

        device
            .enable_password_encrypted
            .as_deref()
            .filter(|stored| !stored.is_empty())
            .map(|stored| {
                SecretString::from(secrets::decrypt_or_passthrough(
                    stored,
                    &self.master_key,
                    &device.name,
                ))
            })
    }

    /// Removes and returns the cached one-time password for a device.
    pub fn take_otp(&self, device_id: Uuid) -> Option<SecretString> {
        self.otp_cache.remove(&device_id)
    }

    /// Clears one cached OTP entry, or all of them. Returns the number of
    /// entries removed; idempotent.
    pub fn clear_otp(&self, device_id: Option<Uuid>) -> usize {
        match device_id {
            Some(id) => {
                let removed = self.otp_cache.remove(&id).is_some();
                if removed {
                    debug!("cleared one-time password cache entry for device {id}");
                }
                usize::from(removed)
            }
            None => {
                self.otp_cache.run_pending_tasks();
                let count = self.otp_cache.iter().count();
                self.otp_cache.invalidate_all();
                self.otp_cache.run_pending_tasks();
                debug!("cleared all one-time password cache entries ({count})");
                count
            }
        }
    }

    /// Non-sensitive connection summary for a device.
    pub fn connection_info(&self, device: &DeviceRecord) -> ConnectionInfo {
        let username = if device.uses_otp {
            device.region.default_cli_username.clone()
        } else {
            device
                .cli_username
                .clone()
                .or_else(|| device.region.default_cli_username.clone())
        };

        ConnectionInfo {
            hostname: device.ip_address.clone(),
            username,
            password_type: if device.uses_otp { "otp" } else { "fixed" }.to_string(),
            has_enable_password: device.enable_password_encrypted.is_some(),
            platform: device.platform.clone(),
            uses_otp: device.uses_otp,
        }
    }

    /// Which fields a caller must supply to connect to a device.
    pub fn credential_requirements(&self, device: &DeviceRecord) -> CredentialRequirements {
        CredentialRequirements {
            requires_username: device.cli_username.is_none()
                && device.region.default_cli_username.is_none(),
            requires_password: device.uses_otp || device.cli_password_encrypted.is_none(),
            requires_enable_password: false,
            uses_otp: device.uses_otp,
        }
    }
}
