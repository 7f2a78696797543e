//! Circular data file
//!
//! Payload bytes live in a single ring file. Virtual offsets are
//! interpreted modulo the file size, and transfers split at the ring
//! boundary. All I/O is positional (pread/pwrite) so concurrent
//! operations never contend on a file position.

use super::DataStore;
use crate::store::BlobReader;
use blobcask_common::Result;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

/// Transfer chunk size for streaming puts
const COPY_CHUNK: usize = 64 * 1024;

/// File-backed circular [`DataStore`].
pub struct FileDataStore {
    file: Arc<File>,
    size: u64,
}

impl FileDataStore {
    pub fn new(file: File, size: u64) -> Self {
        Self {
            file: Arc::new(file),
            size,
        }
    }
}

impl DataStore for FileDataStore {
    fn put(&self, reader: &mut dyn Read, offset: u64) -> Result<()> {
        let mut offset = offset;
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let write_offset = offset % self.size;
            let copy_len = COPY_CHUNK.min((self.size - write_offset) as usize);
            let n = reader.read(&mut buf[..copy_len])?;
            if n == 0 {
                return Ok(());
            }
            self.file.write_all_at(&buf[..n], write_offset)?;
            offset += n as u64;
        }
    }

    fn get(&self, offset: u64, size: i64) -> BlobReader {
        Box::new(FileDataStoreReader {
            file: Arc::clone(&self.file),
            ring_size: self.size,
            offset,
            size_left: size.max(0) as u64,
        })
    }
}

struct FileDataStoreReader {
    file: Arc<File>,
    ring_size: u64,
    offset: u64,
    size_left: u64,
}

impl Read for FileDataStoreReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.size_left == 0 || buf.is_empty() {
            return Ok(0);
        }

        let read_offset = self.offset % self.ring_size;
        let mut read_len = self.size_left.min(buf.len() as u64);
        read_len = read_len.min(self.ring_size - read_offset);

        // A read past the physical end of a sparse or truncated file
        // comes back short; the resulting early EOF is caught by the
        // length check in the validator stacked above.
        let n = self.file.read_at(&mut buf[..read_len as usize], read_offset)?;
        self.offset += n as u64;
        self.size_left -= n as u64;
        Ok(n)
    }
}
