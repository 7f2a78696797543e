//! Circular on-disk storage engine
//!
//! A bounded, self-compacting key/value store that persists
//! content-addressed blobs in three files:
//! - a data file holding blob payloads in a ring,
//! - an offset file mapping digests to ring locations, and
//! - a state file snapshotting the ring cursors.
//!
//! Eviction is strictly FIFO by write order: when the ring wraps, the
//! oldest payloads are overwritten and their offset records become
//! unreachable. The engine tolerates power loss and torn writes
//! without an external index; corruption is detected by the cursor
//! bounds check here and by the checksum validator stacked above.

mod caching_offset_store;
mod cursors;
mod data_store;
mod offset_store;
mod simple_digest;
mod state_store;
mod store;

pub use caching_offset_store::CachingOffsetStore;
pub use cursors::Cursors;
pub use data_store::FileDataStore;
pub use offset_store::{FileOffsetStore, DEFAULT_MAX_ATTEMPTS, OFFSET_RECORD_LEN};
pub use simple_digest::{SimpleDigest, SIMPLE_DIGEST_LEN};
pub use state_store::FileStateStore;
pub use store::{CircularBlobStore, DEFAULT_STATE_FLUSH_INTERVAL};

use crate::store::BlobReader;
use blobcask_common::Result;
use std::io::Read;

/// Maps a digest to the offset and length of the blob's payload
/// within the data file. Implementations are driven under the
/// engine's lock and need no internal synchronization.
pub trait OffsetStore: Send {
    /// Look up a digest. `None` means not stored or no longer valid
    /// under `cursors`.
    fn get(&mut self, digest: &SimpleDigest, cursors: &Cursors) -> Result<Option<(u64, i64)>>;

    /// Record that `digest`'s payload lives at `offset` for `length`
    /// bytes.
    fn put(
        &mut self,
        digest: &SimpleDigest,
        offset: u64,
        length: i64,
        cursors: &Cursors,
    ) -> Result<()>;
}

/// Holds blob payloads, addressed by a virtual offset interpreted
/// modulo the ring size. Operations are lock free; visibility
/// ordering is the offset store's responsibility.
pub trait DataStore: Send + Sync {
    /// Consume `reader` to EOF, writing its bytes starting at the
    /// virtual `offset`.
    fn put(&self, reader: &mut dyn Read, offset: u64) -> Result<()>;

    /// Lazily read `size` bytes starting at the virtual `offset`.
    fn get(&self, offset: u64, size: i64) -> BlobReader;
}

/// Persists the engine's global metadata: the pair of ring cursors.
pub trait StateStore: Send + Sync {
    fn get(&self) -> Result<Cursors>;
    fn put(&self, cursors: Cursors) -> Result<()>;
}
