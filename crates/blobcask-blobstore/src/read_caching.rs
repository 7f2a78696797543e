//! Read caching
//!
//! Turns a fast data store into a read cache for a slow one. Writes
//! always go to the slow store; reads try the fast store first and
//! populate it on miss by streaming the blob over from the slow side.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Error, Result};
use std::sync::Arc;
use std::thread;

/// Adapter composing a slow authoritative store with a fast cache.
pub struct ReadCachingStore {
    slow: Arc<dyn BlobStore>,
    fast: Arc<dyn BlobStore>,
}

impl ReadCachingStore {
    pub fn new(slow: Arc<dyn BlobStore>, fast: Arc<dyn BlobStore>) -> Self {
        Self { slow, fast }
    }

    fn populate(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        let reader = self.slow.get(ctx, digest)?;
        self.fast.put(ctx, digest, digest.size_bytes(), reader)
    }
}

impl BlobStore for ReadCachingStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        match self.fast.get(ctx, digest) {
            Err(Error::NotFound) => {
                self.populate(ctx, digest)?;
                self.fast.get(ctx, digest)
            }
            result => result,
        }
    }

    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()> {
        self.slow.put(ctx, digest, size_bytes, reader)
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        let (slow_result, fast_result) = thread::scope(|scope| {
            let fast_handle = scope.spawn(|| self.fast.delete(ctx, digest));
            let slow_result = self.slow.delete(ctx, digest);
            (
                slow_result,
                fast_handle.join().expect("delete worker panicked"),
            )
        });
        slow_result?;
        fast_result
    }

    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
        self.slow.find_missing(ctx, digests)
    }
}
