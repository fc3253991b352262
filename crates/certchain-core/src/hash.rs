//! Content hashing.
//!
//! Raw content is hashed with plain Blake3 so that anyone holding the bytes
//! can recompute the digest with a stock tool. Structured metadata is hashed
//! over its canonical CBOR encoding under a derived key, which keeps metadata
//! digests from colliding with content digests.

use serde::Serialize;

use crate::canonical::canonical_bytes;
use crate::digest::Digest;
use crate::error::Result;

/// Key derivation context for structured metadata.
const METADATA_CONTEXT: &str = "certchain-v1 structured metadata";

/// Deterministic hashing of content and structured metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    /// Hash raw content bytes.
    pub fn hash_content(content: &[u8]) -> Digest {
        Digest::hash(content)
    }

    /// Hash a structured value via its canonical encoding.
    pub fn hash_structured<T: Serialize + ?Sized>(value: &T) -> Result<Digest> {
        let bytes = canonical_bytes(value)?;
        let mut hasher = blake3::Hasher::new_derive_key(METADATA_CONTEXT);
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }

    /// Hash a salted text value as `"{salt}:{text}"`.
    pub fn hash_salted(salt: &str, text: &str) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(salt.as_bytes());
        hasher.update(b":");
        hasher.update(text.as_bytes());
        hasher.finalize().into()
    }

    /// Combine two child digests into their parent: `H(left || right)`.
    pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(left.as_bytes());
        hasher.update(right.as_bytes());
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_hash_is_plain_blake3() {
        let content = b"product sheet v1";
        assert_eq!(
            ContentHasher::hash_content(content).0,
            *blake3::hash(content).as_bytes()
        );
    }

    #[test]
    fn test_structured_hash_deterministic() {
        let a = ContentHasher::hash_structured(&json!({ "model": "m1", "params": { "t": 1 } })).unwrap();
        let b = ContentHasher::hash_structured(&json!({ "params": { "t": 1 }, "model": "m1" })).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_structured_hash_is_domain_separated() {
        let text = "hello";
        let structured = ContentHasher::hash_structured(text).unwrap();
        let raw = ContentHasher::hash_content(&canonical_bytes(text).unwrap());
        assert_ne!(structured, raw);
    }

    #[test]
    fn test_salted_hash_depends_on_salt() {
        let a = ContentHasher::hash_salted("s1", "prompt");
        let b = ContentHasher::hash_salted("s2", "prompt");
        assert_ne!(a, b);
        assert_eq!(a, ContentHasher::hash_content(b"s1:prompt"));
    }

    #[test]
    fn test_pair_hash_is_ordered() {
        let l = Digest::hash(b"l");
        let r = Digest::hash(b"r");
        assert_ne!(ContentHasher::hash_pair(&l, &r), ContentHasher::hash_pair(&r, &l));

        let mut concat = Vec::new();
        concat.extend_from_slice(l.as_bytes());
        concat.extend_from_slice(r.as_bytes());
        assert_eq!(ContentHasher::hash_pair(&l, &r), Digest::hash(&concat));
    }
}
