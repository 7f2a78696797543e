//! Checksum and length validation
//!
//! Wraps any blob store so that every payload crossing it is verified
//! against its digest. Writes that do not hash to the declared digest
//! are rejected before their index entry exists. Reads that fail
//! verification additionally delete the corrupt blob from the
//! underlying store, so a later `find_missing` reports it absent and
//! re-upload can proceed: this is the stack's self-healing mechanism.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Error, Result};
use digest::DynDigest;
use std::io::Read;
use std::sync::Arc;
use tracing::warn;

/// Blob store adapter validating payload length and checksum in both
/// directions.
pub struct MerkleValidatingStore {
    inner: Arc<dyn BlobStore>,
}

impl MerkleValidatingStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self { inner }
    }
}

impl BlobStore for MerkleValidatingStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        digest.validate()?;
        let reader = self.inner.get(ctx, digest)?;
        Ok(Box::new(ChecksumValidatingReader {
            inner: reader,
            hasher: digest.new_hasher()?,
            digest: digest.clone(),
            size_left: digest.size_bytes(),
            finished: false,
            corruption_handler: Some(CorruptionHandler {
                store: Arc::clone(&self.inner),
                ctx: ctx.clone(),
            }),
        }))
    }

    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()> {
        digest.validate()?;
        if size_bytes != digest.size_bytes() {
            return Err(Error::invalid_argument(format!(
                "attempted to put blob of size {size_bytes}, whereas the digest contains size {}",
                digest.size_bytes()
            )));
        }
        self.inner.put(
            ctx,
            digest,
            size_bytes,
            Box::new(ChecksumValidatingReader {
                inner: reader,
                hasher: digest.new_hasher()?,
                digest: digest.clone(),
                size_left: size_bytes,
                finished: false,
                corruption_handler: None,
            }),
        )
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        digest.validate()?;
        self.inner.delete(ctx, digest)
    }

    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
        for digest in digests {
            digest.validate()?;
        }
        self.inner.find_missing(ctx, digests)
    }
}

/// Deletes a blob whose payload failed verification on the read path.
struct CorruptionHandler {
    store: Arc<dyn BlobStore>,
    ctx: Context,
}

/// Reader that hashes the stream as it passes and fails it if the
/// byte count or checksum disagrees with the digest. Overrun fails
/// immediately; undersize and checksum mismatch are detected at EOF.
struct ChecksumValidatingReader {
    inner: BlobReader,
    hasher: Box<dyn DynDigest + Send>,
    digest: Digest,
    size_left: i64,
    finished: bool,
    /// Present on the read path only
    corruption_handler: Option<CorruptionHandler>,
}

impl ChecksumValidatingReader {
    fn fail(&mut self, message: String) -> std::io::Error {
        match self.corruption_handler.take() {
            Some(handler) => {
                // Reads hit corruption in the underlying store; evict
                // the blob so it can be re-uploaded.
                if let Err(err) = handler.store.delete(&handler.ctx, &self.digest) {
                    warn!("failed to delete corrupt blob {}: {err}", self.digest);
                }
                Error::internal(message).into_io()
            }
            None => Error::invalid_argument(message).into_io(),
        }
    }
}

impl Read for ChecksumValidatingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.finished = true;
            if self.size_left != 0 {
                return Err(self.fail(format!(
                    "blob is {} bytes shorter than expected",
                    self.size_left
                )));
            }
            let actual = self.hasher.finalize_reset();
            if actual.as_ref() != self.digest.hash_bytes() {
                return Err(self.fail(format!(
                    "checksum of blob is {}, while {} was expected",
                    hex::encode(&actual),
                    self.digest.hash_hex()
                )));
            }
            return Ok(0);
        }

        self.hasher.update(&buf[..n]);
        let overrun = n as i64 - self.size_left;
        if overrun > 0 {
            self.finished = true;
            return Err(self.fail(format!("blob is at least {overrun} bytes longer than expected")));
        }
        self.size_left -= n as i64;
        Ok(n)
    }
}
