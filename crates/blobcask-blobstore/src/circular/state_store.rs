//! Cursor snapshot file
//!
//! Sixteen bytes at offset zero: the read and write cursors as
//! little-endian u64s. A file that was never written, or one holding
//! an inconsistent pair, degrades to zero cursors; the offset store's
//! bounds check rejects any stale lookups that survive the rollback.

use super::{Cursors, StateStore};
use blobcask_common::{Error, Result};
use std::fs::File;
use std::os::unix::fs::FileExt;

/// File-backed [`StateStore`].
pub struct FileStateStore {
    file: File,
}

impl FileStateStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl StateStore for FileStateStore {
    fn get(&self) -> Result<Cursors> {
        let mut raw = [0u8; 16];
        let mut filled = 0;
        while filled < raw.len() {
            let n = self.file.read_at(&mut raw[filled..], filled as u64)?;
            if n == 0 {
                // Never written.
                return Ok(Cursors::default());
            }
            filled += n;
        }

        let read = u64::from_le_bytes(raw[..8].try_into().unwrap());
        let write = u64::from_le_bytes(raw[8..].try_into().unwrap());
        if read > write {
            return Ok(Cursors::default());
        }
        Ok(Cursors { read, write })
    }

    fn put(&self, cursors: Cursors) -> Result<()> {
        if cursors.read > cursors.write {
            return Err(Error::internal(format!(
                "refusing to persist inconsistent cursors: {} > {}",
                cursors.read, cursors.write
            )));
        }
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&cursors.read.to_le_bytes());
        raw[8..].copy_from_slice(&cursors.write.to_le_bytes());
        self.file.write_all_at(&raw, 0)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_fresh_file_yields_zero_cursors() {
        let store = FileStateStore::new(tempfile().unwrap());
        assert_eq!(store.get().unwrap(), Cursors::default());
    }

    #[test]
    fn test_round_trip() {
        let store = FileStateStore::new(tempfile().unwrap());
        let cursors = Cursors {
            read: 123,
            write: 456,
        };
        store.put(cursors).unwrap();
        assert_eq!(store.get().unwrap(), cursors);
    }

    #[test]
    fn test_inconsistent_pair_degrades_to_zero() {
        let store = FileStateStore::new(tempfile().unwrap());
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&500u64.to_le_bytes());
        raw[8..].copy_from_slice(&100u64.to_le_bytes());
        store.file.write_all_at(&raw, 0).unwrap();
        assert_eq!(store.get().unwrap(), Cursors::default());
    }

    #[test]
    fn test_refuses_to_persist_inconsistent_pair() {
        let store = FileStateStore::new(tempfile().unwrap());
        let result = store.put(Cursors {
            read: 500,
            write: 100,
        });
        assert!(result.is_err());
    }
}
