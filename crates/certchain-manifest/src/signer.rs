//! Manifest signing and verification.

use std::time::Duration;

use tracing::{debug, warn};

use certchain_core::{canonical_bytes, now_millis};

use crate::envelope::{SignedManifestEnvelope, VerifyFailure, ENVELOPE_VERSION};
use crate::error::Result;
use crate::key::{
    resolve_key, KeySource, SigningKey, EPHEMERAL_KEY_WARNING, INSECURE_EPHEMERAL_ENV,
    SIGNING_KEY_ENV,
};
use crate::manifest::{build_manifest, ClaimIdentity, Manifest, SignableContent};

/// Algorithm label written into every manifest.
pub const ALGORITHM: &str = "BLAKE3-KEYED";

/// Allowed clock skew for timestamps in the future.
const FUTURE_SKEW_MS: i64 = 60_000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Signer settings.
#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// Hex signing key. Falls back to `CERTCHAIN_SIGNING_KEY`.
    pub signing_key: Option<String>,
    pub issuer: String,
    pub software_agent: String,
    pub claim_generator: String,
    /// Signatures older than this produce a warning.
    pub max_timestamp_age: Duration,
    /// Permit a random per-process key when no key is configured.
    pub allow_ephemeral_key: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            issuer: "certchain".to_string(),
            software_agent: "certchain".to_string(),
            claim_generator: format!("certchain/{}", env!("CARGO_PKG_VERSION")),
            max_timestamp_age: Duration::from_secs(365 * 24 * 60 * 60),
            allow_ephemeral_key: false,
        }
    }
}

impl SignerConfig {
    /// Defaults, with insecure mode taken from `CERTCHAIN_INSECURE_EPHEMERAL_KEY`.
    pub fn from_env() -> Self {
        let allow_ephemeral_key = std::env::var(INSECURE_EPHEMERAL_ENV)
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        Self {
            allow_ephemeral_key,
            ..Self::default()
        }
    }

    /// Defaults with an explicit key.
    pub fn with_key(hex_key: impl Into<String>) -> Self {
        Self {
            signing_key: Some(hex_key.into()),
            ..Self::default()
        }
    }
}

/// Output of a signing operation.
#[derive(Debug, Clone)]
pub struct SignedManifest {
    pub envelope: SignedManifestEnvelope,
    /// Serialized envelope.
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Outcome of verifying envelope bytes.
#[derive(Debug, Clone, Default)]
pub struct ManifestVerification {
    pub valid: bool,
    pub manifest: Option<Manifest>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub failure: Option<VerifyFailure>,
}

impl ManifestVerification {
    fn failed(failure: VerifyFailure, manifest: Option<Manifest>) -> Self {
        Self {
            valid: false,
            manifest,
            errors: vec![failure.to_string()],
            warnings: Vec::new(),
            failure: Some(failure),
        }
    }
}

/// Signs manifests with a keyed hash and verifies envelopes.
///
/// Holds no mutable state beyond the key, so it can be shared freely.
#[derive(Debug)]
pub struct ManifestSigner {
    key: SigningKey,
    source: KeySource,
    config: SignerConfig,
}

impl ManifestSigner {
    /// Create a signer, resolving the key from config, then the environment,
    /// then (in insecure mode only) an ephemeral key.
    pub fn new(config: SignerConfig) -> Result<Self> {
        let env_key = std::env::var(SIGNING_KEY_ENV).ok();
        let (key, source) = resolve_key(
            config.signing_key.as_deref(),
            env_key.as_deref(),
            config.allow_ephemeral_key,
        )?;
        debug!(fingerprint = %key.fingerprint(), ?source, "Manifest signer ready");
        Ok(Self {
            key,
            source,
            config,
        })
    }

    /// Create a signer around an existing key.
    pub fn with_key(key: SigningKey, config: SignerConfig) -> Self {
        Self {
            key,
            source: KeySource::Configured,
            config,
        }
    }

    pub fn key_source(&self) -> KeySource {
        self.source
    }

    /// Hex fingerprint of the active key.
    pub fn key_fingerprint(&self) -> String {
        self.key.fingerprint().to_hex()
    }

    /// Build, sign and serialize a manifest for `content`.
    pub fn sign(&self, content: &SignableContent) -> Result<SignedManifest> {
        let identity = ClaimIdentity {
            claim_generator: &self.config.claim_generator,
            issuer: &self.config.issuer,
            software_agent: &self.config.software_agent,
            algorithm: ALGORITHM,
        };
        let manifest = build_manifest(content, &identity, now_millis());
        self.seal(manifest)
    }

    /// Sign an already built manifest.
    pub fn seal(&self, manifest: Manifest) -> Result<SignedManifest> {
        let signature = self.key.mac(&canonical_bytes(&manifest)?);
        let envelope = SignedManifestEnvelope {
            version: ENVELOPE_VERSION,
            manifest,
            hmac_signature: signature.to_hex().to_string(),
            key_fingerprint: self.key_fingerprint(),
        };
        let bytes = envelope.to_bytes()?;

        let mut warnings = Vec::new();
        if self.source == KeySource::Ephemeral {
            warnings.push(format!("{EPHEMERAL_KEY_WARNING}; signed with an ephemeral key"));
        }

        debug!(claim_id = %envelope.manifest.claim_id, "Signed manifest");
        Ok(SignedManifest {
            envelope,
            bytes,
            warnings,
        })
    }

    /// Verify envelope bytes.
    ///
    /// Never errors: every problem is reported in the returned value.
    pub fn verify(&self, bytes: &[u8]) -> ManifestVerification {
        let envelope = match SignedManifestEnvelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err((failure, manifest)) => {
                let mut report = ManifestVerification::failed(failure.clone(), manifest);
                if failure == VerifyFailure::NotWrapped {
                    report
                        .warnings
                        .push("Parsed as unsigned manifest".to_string());
                }
                return report;
            }
        };

        let Some(claimed) = parse_signature(&envelope.hmac_signature) else {
            return ManifestVerification::failed(
                VerifyFailure::Malformed(
                    "signature is not 64 lowercase hex characters".to_string(),
                ),
                Some(envelope.manifest),
            );
        };
        let canonical = match canonical_bytes(&envelope.manifest) {
            Ok(bytes) => bytes,
            Err(e) => {
                return ManifestVerification::failed(
                    VerifyFailure::Malformed(e.to_string()),
                    Some(envelope.manifest),
                )
            }
        };

        let current_fingerprint = self.key_fingerprint();
        let same_key = envelope.key_fingerprint == current_fingerprint;
        // blake3::Hash equality is constant-time.
        let mac_ok = self.key.mac(&canonical) == claimed;

        let mut report = if mac_ok {
            ManifestVerification {
                valid: true,
                ..Default::default()
            }
        } else if same_key {
            ManifestVerification::failed(VerifyFailure::TamperDetected, None)
        } else {
            ManifestVerification::failed(VerifyFailure::WrongKey, None)
        };

        if mac_ok && !same_key {
            report.warnings.push(format!(
                "Signing key fingerprint mismatch: envelope={}..., current={}...",
                prefix(&envelope.key_fingerprint),
                prefix(&current_fingerprint)
            ));
        }
        self.check_timestamp(envelope.manifest.signature.time, &mut report.warnings);
        if self.source == KeySource::Ephemeral {
            report
                .warnings
                .push(format!("{EPHEMERAL_KEY_WARNING}; verified with an ephemeral key"));
        }

        if let Some(failure) = &report.failure {
            warn!(claim_id = %envelope.manifest.claim_id, %failure, "Manifest verification failed");
        }
        report.manifest = Some(envelope.manifest);
        report
    }

    /// Pull the manifest out of envelope or bare-manifest bytes.
    pub fn extract_manifest(&self, bytes: &[u8]) -> Option<Manifest> {
        crate::envelope::extract_manifest(bytes)
    }

    fn check_timestamp(&self, signed_at: i64, warnings: &mut Vec<String>) {
        let max_age = i64::try_from(self.config.max_timestamp_age.as_millis()).unwrap_or(i64::MAX);
        let age = now_millis().saturating_sub(signed_at);
        if age > max_age {
            warnings.push(format!(
                "Manifest timestamp is {} days old (max allowed: {} days)",
                age / DAY_MS,
                max_age / DAY_MS
            ));
        } else if age < -FUTURE_SKEW_MS {
            warnings.push("Manifest timestamp is in the future".to_string());
        }
    }
}

/// Strict parse: exactly 64 lowercase hex characters.
fn parse_signature(s: &str) -> Option<blake3::Hash> {
    let canonical = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !canonical {
        return None;
    }
    let bytes: [u8; 32] = hex::decode(s).ok()?.try_into().ok()?;
    Some(blake3::Hash::from(bytes))
}

fn prefix(s: &str) -> &str {
    s.get(..16).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Citation;

    const KEY_A: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn signer(hex: &str) -> ManifestSigner {
        ManifestSigner::new(SignerConfig::with_key(hex)).unwrap()
    }

    fn content() -> SignableContent {
        SignableContent {
            id: "doc-7".to_string(),
            container_type: "document".to_string(),
            namespace: "acme".to_string(),
            version: 1,
            name: "Safety data sheet".to_string(),
            author: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            body: b"hazard: none".to_vec(),
            citations: vec![Citation::new("src-1")],
        }
    }

    #[test]
    fn test_sign_verify() {
        let signer = signer(KEY_A);
        let signed = signer.sign(&content()).unwrap();
        assert!(signed.warnings.is_empty());
        assert_eq!(signed.envelope.manifest.signature.algorithm, ALGORITHM);
        assert_eq!(signed.envelope.key_fingerprint, signer.key_fingerprint());

        let report = signer.verify(&signed.bytes);
        assert!(report.valid, "{:?}", report.errors);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
        assert!(report.failure.is_none());
        assert_eq!(report.manifest.unwrap(), signed.envelope.manifest);
    }

    #[test]
    fn test_tampered_manifest() {
        let signer = signer(KEY_A);
        let mut envelope = signer.sign(&content()).unwrap().envelope;
        envelope.manifest.title = "Forged".to_string();
        let bytes = envelope.to_bytes().unwrap();

        let report = signer.verify(&bytes);
        assert!(!report.valid);
        assert_eq!(report.failure, Some(VerifyFailure::TamperDetected));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.manifest.unwrap().title, "Forged");
    }

    #[test]
    fn test_zeroed_signature() {
        let signer = signer(KEY_A);
        let mut envelope = signer.sign(&content()).unwrap().envelope;
        envelope.hmac_signature = "0".repeat(64);
        let report = signer.verify(&envelope.to_bytes().unwrap());
        assert!(!report.valid);
        assert_eq!(report.failure, Some(VerifyFailure::TamperDetected));
    }

    #[test]
    fn test_uppercase_signature_rejected() {
        let signer = signer(KEY_A);
        let mut envelope = signer.sign(&content()).unwrap().envelope;
        envelope.hmac_signature = envelope.hmac_signature.to_uppercase();
        let report = signer.verify(&envelope.to_bytes().unwrap());
        assert!(!report.valid);
        assert!(matches!(report.failure, Some(VerifyFailure::Malformed(_))));
    }

    #[test]
    fn test_wrong_key() {
        let signed = signer(KEY_A).sign(&content()).unwrap();
        let other = signer(&"ee".repeat(32));

        let report = other.verify(&signed.bytes);
        assert!(!report.valid);
        assert_eq!(report.failure, Some(VerifyFailure::WrongKey));
        assert!(report.errors[0].contains("different key"));
    }

    #[test]
    fn test_fingerprint_mismatch_is_warning() {
        let signer = signer(KEY_A);
        let mut envelope = signer.sign(&content()).unwrap().envelope;
        envelope.key_fingerprint = "ab".repeat(32);

        let report = signer.verify(&envelope.to_bytes().unwrap());
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("Signing key fingerprint mismatch"));
    }

    #[test]
    fn test_bare_manifest() {
        let signer = signer(KEY_A);
        let signed = signer.sign(&content()).unwrap();
        let bare = serde_json::to_vec(&signed.envelope.manifest).unwrap();

        let report = signer.verify(&bare);
        assert!(!report.valid);
        assert_eq!(report.failure, Some(VerifyFailure::NotWrapped));
        assert_eq!(report.errors, vec!["Manifest is not wrapped in a signed envelope"]);
        assert!(report.manifest.is_some());
    }

    #[test]
    fn test_garbage() {
        let report = signer(KEY_A).verify(b"\x00\x01garbage");
        assert!(!report.valid);
        assert!(matches!(report.failure, Some(VerifyFailure::Malformed(_))));
        assert!(report.manifest.is_none());
    }

    #[test]
    fn test_timestamp_warnings() {
        let signer = signer(KEY_A);
        let mut manifest = signer.sign(&content()).unwrap().envelope.manifest;

        manifest.signature.time = now_millis() - 400 * DAY_MS;
        let report = signer.verify(&signer.seal(manifest.clone()).unwrap().bytes);
        assert!(report.valid);
        assert!(report.warnings[0].contains("days old (max allowed: 365 days)"));

        manifest.signature.time = now_millis() + 10 * 60_000;
        let report = signer.verify(&signer.seal(manifest.clone()).unwrap().bytes);
        assert!(report.valid);
        assert_eq!(report.warnings, vec!["Manifest timestamp is in the future"]);

        manifest.signature.time = now_millis() + 30_000;
        let report = signer.verify(&signer.seal(manifest).unwrap().bytes);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_ephemeral_key_warnings() {
        let config = SignerConfig {
            allow_ephemeral_key: true,
            ..SignerConfig::default()
        };
        let (key, source) = resolve_key(None, None, config.allow_ephemeral_key).unwrap();
        let signer = ManifestSigner {
            key,
            source,
            config,
        };

        let signed = signer.sign(&content()).unwrap();
        assert!(signed.warnings[0].starts_with(EPHEMERAL_KEY_WARNING));
        let report = signer.verify(&signed.bytes);
        assert!(report.valid);
        assert!(report.warnings.iter().any(|w| w.starts_with(EPHEMERAL_KEY_WARNING)));
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let signed = signer(KEY_A).sign(&content()).unwrap();
        let parsed = SignedManifestEnvelope::from_bytes(&signed.bytes).unwrap();
        assert_eq!(parsed.to_bytes().unwrap(), signed.bytes);
    }

    #[test]
    fn test_extract_manifest() {
        let signer = signer(KEY_A);
        let signed = signer.sign(&content()).unwrap();
        assert_eq!(
            signer.extract_manifest(&signed.bytes),
            Some(signed.envelope.manifest)
        );
        assert!(signer.extract_manifest(b"{}").is_none());
    }
}
