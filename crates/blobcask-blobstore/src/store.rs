//! The blob store capability trait
//!
//! [`BlobStore`] is the single abstraction shared by every layer of
//! the stack: the circular engine implements it against disk, and
//! every adapter both consumes and implements it. Layering strictly
//! top-down keeps the composition acyclic.

use blobcask_common::{Context, Digest, Result};
use std::io::Read;

/// A blob payload stream. Single use, forward only; dropping it
/// releases any underlying resources.
pub type BlobReader = Box<dyn Read + Send>;

/// Abstraction for a data store holding both a Content Addressable
/// Storage and an Action Cache.
///
/// Operations are blocking; callers are expected to dispatch many in
/// parallel. Each accepts a [`Context`] whose cancellation aborts
/// in-flight streams.
pub trait BlobStore: Send + Sync {
    /// Open a blob for reading. Fails with `NotFound` if absent.
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader>;

    /// Store a blob. `size_bytes` is the declared payload length; the
    /// reader is consumed to EOF.
    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()>;

    /// Remove a blob. Removing an absent blob is not an error.
    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()>;

    /// Partition `digests` into present and absent, returning the
    /// absent ones.
    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>>;
}

/// Reader adapter that aborts the stream when its context is
/// cancelled, checking at every chunk boundary.
pub(crate) struct CancellableReader<R> {
    inner: R,
    ctx: Context,
}

impl<R: Read> CancellableReader<R> {
    pub(crate) fn new(inner: R, ctx: Context) -> Self {
        Self { inner, ctx }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if let Err(err) = self.ctx.check() {
            return Err(err.into_io());
        }
        self.inner.read(buf)
    }
}
