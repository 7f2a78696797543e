//! Blob digest model
//!
//! A [`Digest`] identifies a blob by content hash and size, plus an
//! opaque instance name used for routing. The hashing algorithm is
//! selected by the length of the hash: 16 bytes is MD5, 20 bytes is
//! SHA-1 and 32 bytes is SHA-256. No other lengths are accepted.

use crate::error::{Error, Result};
use digest::DynDigest;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use std::fmt;

/// Hashing algorithm of a digest, selected by hash length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Select the algorithm matching a binary hash length.
    pub fn from_hash_len(len: usize) -> Result<Self> {
        match len {
            16 => Ok(Self::Md5),
            20 => Ok(Self::Sha1),
            32 => Ok(Self::Sha256),
            _ => Err(Error::invalid_argument(format!(
                "unknown digest hash length: {len} bytes"
            ))),
        }
    }

    /// Length in bytes of hashes produced by this algorithm
    #[must_use]
    pub const fn hash_len(&self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
        }
    }

    /// Construct a fresh hasher for this algorithm
    #[must_use]
    pub fn new_hasher(&self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Md5 => Box::new(Md5::default()),
            Self::Sha1 => Box::new(Sha1::default()),
            Self::Sha256 => Box::new(Sha256::default()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }
}

/// Key format used when serializing a digest into a routing key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestKeyFormat {
    /// Key on hash and size only. Used for the Content Addressable
    /// Storage, where identical payloads collapse across instances.
    WithoutInstance,
    /// Key on hash, size and instance. Used for the Action Cache,
    /// where identical actions may yield different results per
    /// instance.
    WithInstance,
}

/// Identifier of a blob: content hash, payload size and an opaque
/// instance name. Immutable once constructed.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    instance: String,
    hash: Vec<u8>,
    size_bytes: i64,
}

impl Digest {
    /// Parse and validate a client-supplied digest triple. The hash
    /// must be lowercase hexadecimal of a recognized length, the size
    /// non-negative, and the instance restricted to alphanumerics,
    /// `-` and `_`.
    pub fn new(instance: impl Into<String>, hash_hex: &str, size_bytes: i64) -> Result<Self> {
        if hash_hex.bytes().any(|c| c.is_ascii_uppercase()) {
            return Err(Error::invalid_argument(
                "digest hash must be lowercase hexadecimal",
            ));
        }
        let hash = hex::decode(hash_hex).map_err(|e| {
            Error::invalid_argument(format!("digest hash is not valid hexadecimal: {e}"))
        })?;
        let digest = Self {
            instance: instance.into(),
            hash,
            size_bytes,
        };
        digest.validate()?;
        Ok(digest)
    }

    /// Construct a digest from raw parts without validation. Intended
    /// for ingress points that validate separately.
    #[must_use]
    pub fn from_parts(instance: impl Into<String>, hash: Vec<u8>, size_bytes: i64) -> Self {
        Self {
            instance: instance.into(),
            hash,
            size_bytes,
        }
    }

    /// Compute the digest of an in-memory payload.
    #[must_use]
    pub fn of_bytes(instance: impl Into<String>, algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = algorithm.new_hasher();
        hasher.update(data);
        Self {
            instance: instance.into(),
            hash: hasher.finalize_reset().into_vec(),
            size_bytes: data.len() as i64,
        }
    }

    /// Validate the digest invariants: recognized hash length,
    /// non-negative size, well-formed instance name.
    pub fn validate(&self) -> Result<()> {
        HashAlgorithm::from_hash_len(self.hash.len())?;
        if self.size_bytes < 0 {
            return Err(Error::invalid_argument(format!(
                "invalid digest size: {} bytes",
                self.size_bytes
            )));
        }
        for c in self.instance.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                return Err(Error::invalid_argument(format!(
                    "invalid character in instance name: {c:?}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn instance(&self) -> &str {
        &self.instance
    }

    #[must_use]
    pub fn hash_bytes(&self) -> &[u8] {
        &self.hash
    }

    /// Lowercase hexadecimal rendering of the hash
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    #[must_use]
    pub fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    /// Whether this digest refers to the empty blob
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    /// The algorithm this digest was produced with
    pub fn algorithm(&self) -> Result<HashAlgorithm> {
        HashAlgorithm::from_hash_len(self.hash.len())
    }

    /// Construct a hasher suitable for recomputing this digest
    pub fn new_hasher(&self) -> Result<Box<dyn DynDigest + Send>> {
        Ok(self.algorithm()?.new_hasher())
    }

    /// Serialize the digest into a routing key. The pipe character is
    /// the field separator, which is why it is banned from hashes and
    /// instance names.
    #[must_use]
    pub fn key(&self, format: DigestKeyFormat) -> String {
        match format {
            DigestKeyFormat::WithoutInstance => {
                format!("{}|{}", self.hash_hex(), self.size_bytes)
            }
            DigestKeyFormat::WithInstance => {
                format!("{}|{}|{}", self.hash_hex(), self.size_bytes, self.instance)
            }
        }
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest({}, {}-{})",
            self.instance,
            self.hash_hex(),
            self.size_bytes
        )
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.hash_hex(), self.size_bytes)
    }
}
