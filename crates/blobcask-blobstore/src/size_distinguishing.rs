//! Size-based routing
//!
//! Routes small and large blobs to separate backends, e.g. small hot
//! blobs into a memory-backed store and large ones onto disk.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Result};
use std::sync::Arc;
use std::thread;

/// Adapter routing blobs by declared size: at most `cutoff_size_bytes`
/// goes to `small`, everything else to `large`.
pub struct SizeDistinguishingStore {
    small: Arc<dyn BlobStore>,
    large: Arc<dyn BlobStore>,
    cutoff_size_bytes: i64,
}

impl SizeDistinguishingStore {
    pub fn new(
        small: Arc<dyn BlobStore>,
        large: Arc<dyn BlobStore>,
        cutoff_size_bytes: i64,
    ) -> Self {
        Self {
            small,
            large,
            cutoff_size_bytes,
        }
    }

    /// Routing always uses the size in the digest, never a separately
    /// provided size: it is the only size the other operations can
    /// re-derive.
    fn backend(&self, digest: &Digest) -> &Arc<dyn BlobStore> {
        if digest.size_bytes() <= self.cutoff_size_bytes {
            &self.small
        } else {
            &self.large
        }
    }
}

impl BlobStore for SizeDistinguishingStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        self.backend(digest).get(ctx, digest)
    }

    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()> {
        self.backend(digest).put(ctx, digest, size_bytes, reader)
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        self.backend(digest).delete(ctx, digest)
    }

    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
        let (small, large): (Vec<Digest>, Vec<Digest>) = digests
            .iter()
            .cloned()
            .partition(|d| d.size_bytes() <= self.cutoff_size_bytes);

        let (small_result, large_result) = thread::scope(|scope| {
            let small_handle = scope.spawn(|| self.small.find_missing(ctx, &small));
            let large_result = self.large.find_missing(ctx, &large);
            (
                small_handle.join().expect("find_missing worker panicked"),
                large_result,
            )
        });

        let mut missing = small_result?;
        missing.extend(large_result?);
        Ok(missing)
    }
}
