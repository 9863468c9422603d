//! Fragment fingerprints
//!
//! A [`Fingerprint`] is the blake3 digest of a canonical fragment's
//! serialized steps. It keys hashing and logging; equality of fragments is
//! still decided on content.

use serde::{Serialize, Serializer};
use std::fmt;

/// blake3 digest identifying a canonical fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap a raw digest
    #[inline]
    #[must_use]
    pub const fn new(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// Digest of `data`
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Digest of the JSON encoding of `value`
    ///
    /// # Errors
    /// [`FingerprintError::Serialization`] if `value` cannot be encoded
    pub fn compute_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, FingerprintError> {
        Ok(Self::compute(&serde_json::to_vec(value)?))
    }

    /// First eight bytes as hex, for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Failure to fingerprint a value
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// The value could not be encoded
    #[error("cannot encode value for fingerprinting: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_content() {
        assert_eq!(Fingerprint::compute(b"abc"), Fingerprint::compute(b"abc"));
        assert_ne!(Fingerprint::compute(b"abc"), Fingerprint::compute(b"abd"));
    }

    #[test]
    fn short_form_prefixes_display() {
        let fp = Fingerprint::compute(b"fragment");
        assert_eq!(fp.to_string().len(), 64);
        assert_eq!(fp.short().len(), 16);
        assert!(fp.to_string().starts_with(&fp.short()));
    }

    #[test]
    fn serializes_as_hex_string() {
        let fp = Fingerprint::compute_serializable(&vec![1u32, 2, 3]).unwrap();
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{fp}\""));
    }
}
