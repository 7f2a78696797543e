//! In-memory cache in front of an offset store
//!
//! The on-disk table costs up to `max_attempts` reads per lookup; this
//! direct-mapped cache answers repeat lookups from memory. There is no
//! negative caching: a miss always consults the backend.

use super::{Cursors, OffsetStore, SimpleDigest};
use blobcask_common::Result;

#[derive(Clone, Copy)]
struct CachedRecord {
    digest: SimpleDigest,
    offset: u64,
    length: i64,
}

/// Direct-mapped cache wrapping any [`OffsetStore`]. Runs under the
/// engine's lock like its backend.
pub struct CachingOffsetStore<S> {
    backend: S,
    table: Vec<Option<CachedRecord>>,
}

impl<S: OffsetStore> CachingOffsetStore<S> {
    pub fn new(backend: S, size: usize) -> Self {
        Self {
            backend,
            table: vec![None; size.max(1)],
        }
    }

    fn slot(&self, digest: &SimpleDigest) -> usize {
        let mut hash = 0x811c9dc5u32;
        for &b in &digest.as_bytes()[..4] {
            hash ^= u32::from(b);
            hash = hash.wrapping_mul(16777619);
        }
        hash as usize % self.table.len()
    }
}

impl<S: OffsetStore> OffsetStore for CachingOffsetStore<S> {
    fn get(&mut self, digest: &SimpleDigest, cursors: &Cursors) -> Result<Option<(u64, i64)>> {
        let slot = self.slot(digest);
        if let Some(cached) = &self.table[slot] {
            if cached.digest == *digest && cursors.contains(cached.offset, cached.length) {
                return Ok(Some((cached.offset, cached.length)));
            }
        }

        let result = self.backend.get(digest, cursors)?;
        if let Some((offset, length)) = result {
            self.table[slot] = Some(CachedRecord {
                digest: *digest,
                offset,
                length,
            });
        }
        Ok(result)
    }

    fn put(
        &mut self,
        digest: &SimpleDigest,
        offset: u64,
        length: i64,
        cursors: &Cursors,
    ) -> Result<()> {
        self.backend.put(digest, offset, length, cursors)?;
        let slot = self.slot(digest);
        self.table[slot] = Some(CachedRecord {
            digest: *digest,
            offset,
            length,
        });
        Ok(())
    }
}
