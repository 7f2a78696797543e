//! On-disk digest table
//!
//! An open-addressed hash table stored in a flat file, self compacting
//! through cuckoo style displacement. A record's slot is derived from
//! FNV-1a over its digest *and* its displacement attempt, so lookup can
//! distinguish a chain's own entry at displacement `k` from an
//! unrelated record colliding at the same slot.
//!
//! Displacement is only ever allowed downwards in recency: a newer
//! record may push an older one to its next slot, never the reverse.
//! This keeps every valid older record reachable within the probe
//! bound, and lets records evicted by the ring wrap be reclaimed
//! naturally, because the cursor bounds check treats them as garbage.

use super::{Cursors, OffsetStore, SimpleDigest, SIMPLE_DIGEST_LEN};
use crate::metrics;
use blobcask_common::{Error, Result};
use std::fs::File;
use std::os::unix::fs::FileExt;

/// Default probe chain bound. This is a lower bound suitable for
/// lightly loaded tables; see `CircularConfig::max_attempts`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// On-disk width of one record: digest, attempt, offset, length.
pub const OFFSET_RECORD_LEN: usize = SIMPLE_DIGEST_LEN + 4 + 8 + 8;

/// Length of the record prefix that determines its slot
const SLOT_KEY_LEN: usize = SIMPLE_DIGEST_LEN + 4;

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811c9dc5u32;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Clone, Copy)]
struct OffsetRecord([u8; OFFSET_RECORD_LEN]);

impl OffsetRecord {
    fn new(digest: &SimpleDigest, attempt: u32, offset: u64, length: i64) -> Self {
        let mut raw = [0u8; OFFSET_RECORD_LEN];
        raw[..SIMPLE_DIGEST_LEN].copy_from_slice(digest.as_bytes());
        raw[SIMPLE_DIGEST_LEN..SIMPLE_DIGEST_LEN + 4].copy_from_slice(&attempt.to_le_bytes());
        raw[SIMPLE_DIGEST_LEN + 4..SIMPLE_DIGEST_LEN + 12].copy_from_slice(&offset.to_le_bytes());
        raw[SIMPLE_DIGEST_LEN + 12..].copy_from_slice(&(length as u64).to_le_bytes());
        Self(raw)
    }

    fn slot(&self) -> u32 {
        fnv1a32(&self.0[..SLOT_KEY_LEN])
    }

    fn attempt(&self) -> u32 {
        u32::from_le_bytes(self.0[SIMPLE_DIGEST_LEN..SIMPLE_DIGEST_LEN + 4].try_into().unwrap())
    }

    fn offset(&self) -> u64 {
        u64::from_le_bytes(
            self.0[SIMPLE_DIGEST_LEN + 4..SIMPLE_DIGEST_LEN + 12]
                .try_into()
                .unwrap(),
        )
    }

    fn length(&self) -> i64 {
        u64::from_le_bytes(self.0[SIMPLE_DIGEST_LEN + 12..].try_into().unwrap()) as i64
    }

    fn with_attempt(&self, attempt: u32) -> Self {
        let mut raw = self.0;
        raw[SIMPLE_DIGEST_LEN..SIMPLE_DIGEST_LEN + 4].copy_from_slice(&attempt.to_le_bytes());
        Self(raw)
    }

    /// Same digest and same attempt
    fn key_matches(&self, other: &OffsetRecord) -> bool {
        self.0[..SLOT_KEY_LEN] == other.0[..SLOT_KEY_LEN]
    }

    /// Whether this record describes data still present in the ring.
    /// Garbage and torn records fail this check: their offset/length
    /// pair falls outside the live region (a negative length always
    /// does).
    fn is_valid_under(&self, cursors: &Cursors) -> bool {
        let length = self.length();
        length >= 0 && cursors.contains(self.offset(), length)
    }
}

/// File-backed [`OffsetStore`].
pub struct FileOffsetStore {
    file: File,
    slots: u64,
    max_attempts: u32,
}

impl FileOffsetStore {
    /// `size` is the offset file size in bytes; the slot count is
    /// derived from it.
    pub fn new(file: File, size: u64, max_attempts: u32) -> Result<Self> {
        let slots = size / OFFSET_RECORD_LEN as u64;
        if slots == 0 {
            return Err(Error::invalid_argument(format!(
                "offset file of {size} bytes is smaller than one record"
            )));
        }
        if max_attempts < 2 {
            return Err(Error::invalid_argument(format!(
                "offset store needs at least 2 probe attempts, got {max_attempts}"
            )));
        }
        Ok(Self {
            file,
            slots,
            max_attempts,
        })
    }

    fn position_of_slot(&self, slot: u32) -> u64 {
        (u64::from(slot) % self.slots) * OFFSET_RECORD_LEN as u64
    }

    fn record_at(&self, position: u64) -> Result<OffsetRecord> {
        let mut raw = [0u8; OFFSET_RECORD_LEN];
        let mut filled = 0;
        while filled < raw.len() {
            let n = self
                .file
                .read_at(&mut raw[filled..], position + filled as u64)?;
            if n == 0 {
                // Past EOF of the sparse file; the rest stays zero.
                break;
            }
            filled += n;
        }
        Ok(OffsetRecord(raw))
    }

    fn write_record(&self, record: &OffsetRecord, position: u64) -> Result<()> {
        self.file.write_all_at(&record.0, position)?;
        Ok(())
    }

    /// One displacement step of an insert. Returns the record that
    /// still needs a home, if any.
    fn put_record(
        &self,
        record: &OffsetRecord,
        cursors: &Cursors,
    ) -> Result<Option<OffsetRecord>> {
        let position = self.position_of_slot(record.slot());

        // If the occupant is garbage, cannot be displaced further, or
        // does not even belong at this slot, just overwrite it.
        let occupant = self.record_at(position)?;
        if !occupant.is_valid_under(cursors)
            || occupant.attempt() >= self.max_attempts - 1
            || self.position_of_slot(occupant.slot()) != position
        {
            self.write_record(record, position)?;
            return Ok(None);
        }

        if occupant.offset() <= record.offset() {
            // The incoming record is at least as recent; it takes the
            // slot and the occupant moves down its own chain.
            self.write_record(record, position)?;
            return Ok(Some(occupant.with_attempt(occupant.attempt() + 1)));
        }

        // The occupant is strictly newer. Move ourselves instead, or
        // give up silently once the chain is exhausted; a future
        // overwrite reclaims the slot.
        if record.attempt() >= self.max_attempts - 1 {
            return Ok(None);
        }
        Ok(Some(record.with_attempt(record.attempt() + 1)))
    }

    #[cfg(test)]
    fn home_position(&self, digest: &SimpleDigest) -> u64 {
        self.position_of_slot(OffsetRecord::new(digest, 0, 0, 0).slot())
    }
}

impl OffsetStore for FileOffsetStore {
    fn get(&mut self, digest: &SimpleDigest, cursors: &Cursors) -> Result<Option<(u64, i64)>> {
        let probes = metrics::registry().offset_store_probes();
        for attempt in 0..self.max_attempts {
            let lookup = OffsetRecord::new(digest, attempt, 0, 0);
            let position = self.position_of_slot(lookup.slot());
            let stored = match self.record_at(position) {
                Ok(stored) => stored,
                Err(err) => {
                    probes.observe("get", "error", attempt + 1);
                    return Err(err);
                }
            };
            if !stored.is_valid_under(cursors) {
                // Garbage or evicted data. Our record cannot have been
                // displaced past a dead slot, so the chain ends here.
                probes.observe("get", "not_found", attempt + 1);
                return Ok(None);
            }
            if stored.key_matches(&lookup) {
                probes.observe("get", "found", attempt + 1);
                return Ok(Some((stored.offset(), stored.length())));
            }
            if self.position_of_slot(stored.slot()) != position {
                // The occupant was displaced here from another chain.
                // Our own entry would have been displaced first.
                probes.observe("get", "not_found", attempt + 1);
                return Ok(None);
            }
        }
        probes.observe("get", "too_many_probes", self.max_attempts);
        Ok(None)
    }

    fn put(
        &mut self,
        digest: &SimpleDigest,
        offset: u64,
        length: i64,
        cursors: &Cursors,
    ) -> Result<()> {
        let probes = metrics::registry().offset_store_probes();
        let mut record = OffsetRecord::new(digest, 0, offset, length);
        for iteration in 1..=self.max_attempts {
            match self.put_record(&record, cursors) {
                Ok(Some(next)) => record = next,
                Ok(None) => {
                    probes.observe("put", "stored", iteration);
                    return Ok(());
                }
                Err(err) => {
                    probes.observe("put", "error", iteration);
                    return Err(err);
                }
            }
        }
        probes.observe("put", "too_many_probes", self.max_attempts);
        Ok(())
    }
}
