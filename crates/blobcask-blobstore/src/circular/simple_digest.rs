//! On-disk digest key for the circular engine

use blobcask_common::Digest;

/// Width of a [`SimpleDigest`]: room for a SHA-256 hash plus a
/// little-endian length field.
pub const SIMPLE_DIGEST_LEN: usize = 32 + 8;

/// The fixed-width digest key used on disk and in memory throughout
/// the circular engine: 32 bytes of hash (zero padded for shorter
/// algorithms) followed by the payload length as a little-endian u64.
///
/// The instance name is deliberately omitted: the CAS is instance
/// agnostic, and the Action Cache keeps the instance in its external
/// key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimpleDigest([u8; SIMPLE_DIGEST_LEN]);

impl SimpleDigest {
    /// Encode a digest into its on-disk key.
    #[must_use]
    pub fn new(digest: &Digest) -> Self {
        let mut raw = [0u8; SIMPLE_DIGEST_LEN];
        let hash = digest.hash_bytes();
        let len = hash.len().min(32);
        raw[..len].copy_from_slice(&hash[..len]);
        raw[32..].copy_from_slice(&(digest.size_bytes() as u64).to_le_bytes());
        Self(raw)
    }

    #[must_use]
    pub const fn from_bytes(raw: [u8; SIMPLE_DIGEST_LEN]) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SIMPLE_DIGEST_LEN] {
        &self.0
    }
}
