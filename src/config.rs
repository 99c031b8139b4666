//! Connection tuning defaults and SSH algorithm preferences.
//!
//! Network gear in the field runs a wide spread of SSH server versions, so the
//! compatibility preference tables below include legacy key-exchange and
//! cipher algorithms alongside modern ones.

use std::borrow::Cow;
use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{Preferred, cipher, compression, kex, mac};

/// Maximum concurrent device sessions per process.
pub const DEFAULT_MAX_SESSIONS: usize = 50;

/// Per-command send/receive timeout.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect + authenticate + first-prompt timeout.
pub const DEFAULT_TRANSPORT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Idle timeout applied to the underlying SSH connection.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifetime of a cached one-time password that is never consumed.
pub const OTP_CACHE_TTL: Duration = Duration::from_secs(300);

/// Key exchange algorithms in order of preference. Legacy Diffie-Hellman
/// variants stay on the list for older switch firmware.
pub const COMPAT_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
];

/// Ciphers in order of preference, modern first, CBC modes for legacy devices.
pub const COMPAT_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

/// MAC algorithms, ETM variants first.
pub const COMPAT_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

/// Compression: none preferred, ZLIB variants accepted.
pub const COMPAT_COMPRESSION: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

/// Host key algorithms, including RSA-SHA1 for legacy devices.
pub const COMPAT_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
    Algorithm::Dsa,
];

/// Algorithm preference set used when opening device transports.
pub fn compatibility_preferred() -> Preferred {
    Preferred {
        kex: Cow::Borrowed(COMPAT_KEX_ORDER),
        key: Cow::Borrowed(COMPAT_KEY_TYPES),
        cipher: Cow::Borrowed(COMPAT_CIPHERS),
        mac: Cow::Borrowed(COMPAT_MAC_ALGORITHMS),
        compression: Cow::Borrowed(COMPAT_COMPRESSION),
    }
}
