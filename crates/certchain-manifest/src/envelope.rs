//! Signed manifest envelope.
//!
//! The envelope is the wire form of a signed manifest: a JSON object with the
//! manifest, the keyed-hash signature over its canonical CBOR encoding and a
//! fingerprint of the key that produced it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::Result;
use crate::manifest::Manifest;

/// Envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// A manifest wrapped with its signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignedManifestEnvelope {
    pub version: u8,
    pub manifest: Manifest,
    /// Hex keyed hash of the canonical manifest.
    pub hmac_signature: String,
    /// Hex fingerprint of the signing key.
    pub key_fingerprint: String,
}

/// Why a manifest failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyFailure {
    /// A bare manifest with no envelope.
    #[error("Manifest is not wrapped in a signed envelope")]
    NotWrapped,

    /// Unparseable bytes or unsupported envelope version.
    #[error("Failed to parse signed manifest envelope: {0}")]
    Malformed(String),

    /// Signature mismatch under the same key.
    #[error("Signature verification failed: manifest content was modified")]
    TamperDetected,

    /// Signature mismatch under a different key.
    #[error("Signature verification failed: envelope was signed with a different key")]
    WrongKey,
}

impl SignedManifestEnvelope {
    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse envelope bytes.
    ///
    /// A bare manifest (a JSON object with a `claimId` and no envelope) is
    /// reported as `NotWrapped`, together with the manifest when it parses.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, (VerifyFailure, Option<Manifest>)> {
        match serde_json::from_slice::<Self>(bytes) {
            Ok(envelope) if envelope.version == ENVELOPE_VERSION => Ok(envelope),
            Ok(envelope) => Err((
                VerifyFailure::Malformed(format!(
                    "unsupported envelope version {}",
                    envelope.version
                )),
                None,
            )),
            Err(e) => match bare_manifest(bytes) {
                Some(manifest) => Err((VerifyFailure::NotWrapped, manifest)),
                None => Err((VerifyFailure::Malformed(e.to_string()), None)),
            },
        }
    }
}

/// Detect a bare manifest. The outer `Option` says whether the bytes look
/// like one; the inner one carries it when it also parses.
fn bare_manifest(bytes: &[u8]) -> Option<Option<Manifest>> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let object = value.as_object()?;
    if object.contains_key("manifest") || !object.get("claimId")?.is_string() {
        return None;
    }
    Some(serde_json::from_value(value).ok())
}

/// Pull the manifest out of envelope or bare-manifest bytes.
pub fn extract_manifest(bytes: &[u8]) -> Option<Manifest> {
    match SignedManifestEnvelope::from_bytes(bytes) {
        Ok(envelope) => Some(envelope.manifest),
        Err((_, manifest)) => manifest,
    }
}
