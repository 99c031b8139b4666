//! Encryption at rest for device passwords.
//!
//! Stored passwords are age-encrypted (scrypt passphrase recipient) and
//! base64-armored behind a sentinel prefix so encrypted values can be told
//! apart from legacy plaintext rows without attempting a decrypt.

use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use secrecy::SecretString;

use crate::error::{NetopsError, Result};

/// Prefix marking an encrypted stored secret.
const ENCRYPTED_PREFIX: &str = "enc:v1:";

fn secret_err<E: std::fmt::Display>(err: E) -> NetopsError {
    NetopsError::SecretDecode(err.to_string())
}

/// True when `value` carries the encryption sentinel.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Encrypts a plaintext password with the process master key.
pub fn encrypt_password(plaintext: &str, key: &SecretString) -> Result<String> {
    if plaintext.is_empty() {
        return Err(NetopsError::SecretDecode(
            "cannot encrypt an empty password".to_string(),
        ));
    }

    let encryptor = age::Encryptor::with_user_passphrase(key.clone());
    let mut ciphertext = Vec::new();
    let mut writer = encryptor.wrap_output(&mut ciphertext).map_err(secret_err)?;
    writer.write_all(plaintext.as_bytes()).map_err(secret_err)?;
    writer.finish().map_err(secret_err)?;

    Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(&ciphertext)))
}

/// Decrypts a value produced by [`encrypt_password`].
pub fn decrypt_password(encoded: &str, key: &SecretString) -> Result<String> {
    let armored = encoded
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| NetopsError::SecretDecode("missing encryption header".to_string()))?;
    let ciphertext = STANDARD.decode(armored).map_err(secret_err)?;

    let decryptor = age::Decryptor::new(&ciphertext[..]).map_err(secret_err)?;
    let identity = age::scrypt::Identity::new(key.clone());
    let mut reader = decryptor
        .decrypt(std::iter::once(&identity as &dyn age::Identity))
        .map_err(secret_err)?;

    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext).map_err(secret_err)?;
    String::from_utf8(plaintext).map_err(secret_err)
}

/// Decrypts a stored secret, tolerating legacy rows.
///
/// Values without the sentinel, and values that fail to decrypt, are returned
/// unchanged so devices saved before encryption was introduced keep working.
/// Both downgrade paths log at warn level; `device` names the record, never
/// the secret.
pub fn decrypt_or_passthrough(stored: &str, key: &SecretString, device: &str) -> String {
    if !is_encrypted(stored) {
        warn!("stored secret for {device} is not encrypted; using it as-is (re-save the device to encrypt it)");
        return stored.to_string();
    }

    match decrypt_password(stored, key) {
        Ok(plaintext) => {
            debug!("decrypted stored secret for {device}");
            plaintext
        }
        Err(err) => {
            warn!("stored secret for {device} failed to decrypt ({err}); using stored value as-is");
            stored.to_string()
        }
    }
}
