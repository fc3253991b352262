//! Signing keys.
//!
//! Manifests are signed with a Blake3 keyed hash, so a signing key is just
//! 32 secret bytes. The fingerprint identifies a key without revealing it.

use std::fmt;
use std::sync::OnceLock;

use rand::RngCore;
use tracing::warn;

use certchain_core::Digest;

use crate::error::{ManifestError, Result};

/// Environment variable holding the hex signing key.
pub const SIGNING_KEY_ENV: &str = "CERTCHAIN_SIGNING_KEY";

/// Environment variable enabling the ephemeral fallback key.
pub const INSECURE_EPHEMERAL_ENV: &str = "CERTCHAIN_INSECURE_EPHEMERAL_KEY";

/// Message used whenever the ephemeral key is selected.
pub const EPHEMERAL_KEY_WARNING: &str = "No signing key configured";

const FINGERPRINT_CONTEXT: &[u8] = b"certchain-v1 signing key fingerprint";

/// A 256-bit manifest signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| ManifestError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ManifestError::InvalidKey(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Keyed hash of `data`.
    pub fn mac(&self, data: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.0, data)
    }

    /// Identifier of this key, safe to publish.
    pub fn fingerprint(&self) -> Digest {
        self.mac(FINGERPRINT_CONTEXT).into()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey({})", &self.fingerprint().to_hex()[..16])
    }
}

/// Where the active signing key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Configured,
    Environment,
    /// Random key living for the rest of the process. Insecure.
    Ephemeral,
}

/// Process-lifetime ephemeral key.
fn ephemeral_key() -> &'static SigningKey {
    static KEY: OnceLock<SigningKey> = OnceLock::new();
    KEY.get_or_init(SigningKey::generate)
}

/// Pick the signing key: explicit, then environment, then (only when
/// allowed) the ephemeral key.
pub fn resolve_key(
    explicit: Option<&str>,
    env: Option<&str>,
    allow_ephemeral: bool,
) -> Result<(SigningKey, KeySource)> {
    if let Some(hex) = explicit {
        return Ok((SigningKey::from_hex(hex)?, KeySource::Configured));
    }
    if let Some(hex) = env.filter(|s| !s.trim().is_empty()) {
        return Ok((SigningKey::from_hex(hex)?, KeySource::Environment));
    }
    if allow_ephemeral {
        warn!(
            "{}; signing with an ephemeral key, signatures will not verify after restart",
            EPHEMERAL_KEY_WARNING
        );
        return Ok((ephemeral_key().clone(), KeySource::Ephemeral));
    }
    Err(ManifestError::MissingKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_from_hex() {
        let key = SigningKey::from_hex(KEY_HEX).unwrap();
        assert_eq!(key.as_bytes()[31], 0x1f);

        assert!(matches!(
            SigningKey::from_hex("abcd"),
            Err(ManifestError::InvalidKey(_))
        ));
        assert!(matches!(
            SigningKey::from_hex("zz"),
            Err(ManifestError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let a = SigningKey::from_hex(KEY_HEX).unwrap();
        let b = SigningKey::generate();
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint().as_bytes(), a.as_bytes());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = SigningKey::from_hex(KEY_HEX).unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains(KEY_HEX));
        assert!(!debug.contains("0001020304"));
    }

    #[test]
    fn test_resolution_order() {
        let other = "ff".repeat(32);

        let (_, source) = resolve_key(Some(KEY_HEX), Some(&other), true).unwrap();
        assert_eq!(source, KeySource::Configured);

        let (key, source) = resolve_key(None, Some(&other), true).unwrap();
        assert_eq!(source, KeySource::Environment);
        assert_eq!(key.as_bytes(), &[0xff; 32]);

        let (_, source) = resolve_key(None, Some("  "), true).unwrap();
        assert_eq!(source, KeySource::Ephemeral);
    }

    #[test]
    fn test_missing_key_without_insecure_mode() {
        assert!(matches!(
            resolve_key(None, None, false),
            Err(ManifestError::MissingKey)
        ));
    }

    #[test]
    fn test_ephemeral_key_lives_for_process() {
        let (a, _) = resolve_key(None, None, true).unwrap();
        let (b, _) = resolve_key(None, None, true).unwrap();
        assert_eq!(a, b);
    }
}
