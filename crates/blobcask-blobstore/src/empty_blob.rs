//! Empty-blob short-circuit
//!
//! Requests for zero-size digests never reach the backend: the empty
//! blob is always present and has empty content. Besides saving
//! round trips, some backends cannot represent empty values at all.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Result};
use std::sync::Arc;

/// Adapter filtering out operations on zero-size digests.
pub struct EmptyBlobFilteringStore {
    inner: Arc<dyn BlobStore>,
}

impl EmptyBlobFilteringStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self { inner }
    }
}

impl BlobStore for EmptyBlobFilteringStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        if digest.is_empty() {
            return Ok(Box::new(std::io::empty()));
        }
        self.inner.get(ctx, digest)
    }

    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()> {
        if digest.is_empty() {
            drop(reader);
            return Ok(());
        }
        self.inner.put(ctx, digest, size_bytes, reader)
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        if digest.is_empty() {
            return Ok(());
        }
        self.inner.delete(ctx, digest)
    }

    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
        let non_empty: Vec<Digest> = digests.iter().filter(|d| !d.is_empty()).cloned().collect();
        self.inner.find_missing(ctx, &non_empty)
    }
}
