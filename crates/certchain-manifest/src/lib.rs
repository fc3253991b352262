//! # certchain manifest
//!
//! Tamper-evident provenance manifests. A [`Manifest`] describes a piece of
//! content with C2PA-style assertions; the [`ManifestSigner`] wraps it in a
//! [`SignedManifestEnvelope`] carrying a Blake3 keyed-hash signature over
//! the manifest's canonical encoding, so the envelope can be checked offline.
//!
//! ## Usage
//!
//! ```rust
//! use certchain_manifest::{ManifestSigner, SignableContent, SignerConfig};
//!
//! let signer = ManifestSigner::new(SignerConfig::with_key("11".repeat(32))).unwrap();
//! let content = SignableContent {
//!     id: "sku-1".into(),
//!     container_type: "product".into(),
//!     namespace: "acme".into(),
//!     version: 1,
//!     name: "Trail Shoe".into(),
//!     author: None,
//!     created_at: 0,
//!     updated_at: 0,
//!     body: b"data sheet".to_vec(),
//!     citations: vec![],
//! };
//!
//! let signed = signer.sign(&content).unwrap();
//! assert!(signer.verify(&signed.bytes).valid);
//! ```
//!
//! ## Keys
//!
//! The key comes from [`SignerConfig::signing_key`] or the
//! `CERTCHAIN_SIGNING_KEY` environment variable. Without either, the signer
//! refuses to start unless insecure mode is enabled, in which case a random
//! key is used for the lifetime of the process.

pub mod envelope;
pub mod error;
pub mod key;
pub mod manifest;
pub mod signer;

pub use envelope::{extract_manifest, SignedManifestEnvelope, VerifyFailure, ENVELOPE_VERSION};
pub use error::{ManifestError, Result};
pub use key::{KeySource, SigningKey};
pub use manifest::{
    Action, Assertion, Citation, Ingredient, Manifest, Relationship, SignableContent,
    SignatureInfo,
};
pub use signer::{ManifestSigner, ManifestVerification, SignedManifest, SignerConfig, ALGORITHM};
