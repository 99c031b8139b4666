//! Device and region record contracts.
//!
//! These records are owned by the external data store; the core only reads
//! them. Field names are part of the persistence boundary and must stay
//! stable across versions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_ssh_port() -> u16 {
    22
}

/// Region a device belongs to. Supplies the fallback CLI username when the
/// device record carries none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RegionRecord {
    pub name: String,
    #[serde(default)]
    pub default_cli_username: Option<String>,
}

/// Kind of network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Switch,
    Router,
}

/// A managed network device as supplied by the data store.
///
/// `cli_password_encrypted` and `enable_password_encrypted` hold values
/// produced by [`crate::secrets::encrypt_password`]; legacy rows may still
/// carry plaintext, which the resolver tolerates.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceRecord {
    pub id: Uuid,
    /// Unique hostname.
    pub name: String,
    /// Management IP address.
    pub ip_address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Platform string, e.g. `cisco_iosxe` or `huawei_vrp`.
    pub platform: String,
    /// Explicit brand field, when the store has one.
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub device_type: DeviceType,
    /// True when the device authenticates with per-session one-time passwords
    /// instead of a stored fixed password.
    pub uses_otp: bool,
    /// Fixed CLI account, used only when `uses_otp` is false.
    #[serde(default)]
    pub cli_username: Option<String>,
    #[serde(default)]
    pub cli_password_encrypted: Option<String>,
    #[serde(default)]
    pub enable_password_encrypted: Option<String>,
    pub region: RegionRecord,
}

impl DeviceRecord {
    /// `ip:port` form used in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A fixed-password switch used across module tests.
    pub fn fixed_password_device(name: &str, stored_password: Option<String>) -> DeviceRecord {
        DeviceRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ip_address: "192.0.2.10".to_string(),
            port: 22,
            platform: "cisco_iosxe".to_string(),
            brand: None,
            model: Some("C9300-48T".to_string()),
            device_type: DeviceType::Switch,
            uses_otp: false,
            cli_username: Some("netadmin".to_string()),
            cli_password_encrypted: stored_password,
            enable_password_encrypted: None,
            region: RegionRecord {
                name: "lab".to_string(),
                default_cli_username: Some("region-default".to_string()),
            },
        }
    }

    /// An OTP-based device with no fixed account.
    pub fn otp_device(name: &str) -> DeviceRecord {
        DeviceRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ip_address: "192.0.2.20".to_string(),
            port: 22,
            platform: "huawei_vrp".to_string(),
            brand: None,
            model: None,
            device_type: DeviceType::Router,
            uses_otp: true,
            cli_username: None,
            cli_password_encrypted: None,
            enable_password_encrypted: None,
            region: RegionRecord {
                name: "core".to_string(),
                default_cli_username: Some("oncall".to_string()),
            },
        }
    }
}
