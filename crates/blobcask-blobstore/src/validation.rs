//! Digest validation at the stack boundary
//!
//! Rejects degenerate digests (unrecognized hash lengths, negative
//! sizes, malformed instance names) before they reach the layers
//! below, so those never have to defend against them.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Result};
use std::sync::Arc;

/// Adapter requiring well-formed digests on every operation.
pub struct ValidatingStore {
    inner: Arc<dyn BlobStore>,
}

impl ValidatingStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self { inner }
    }
}

impl BlobStore for ValidatingStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        digest.validate()?;
        self.inner.get(ctx, digest)
    }

    fn put(
        &self,
        ctx: &Context,
        digest: &Digest,
        size_bytes: i64,
        reader: BlobReader,
    ) -> Result<()> {
        if let Err(err) = digest.validate() {
            drop(reader);
            return Err(err);
        }
        self.inner.put(ctx, digest, size_bytes, reader)
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

#[cfg(test)]
mod tests {
    use super::*;
    use blobcask_common::{Error, HashAlgorithm};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    impl BlobStore for CountingStore {
        fn get(&self, _ctx: &Context, _digest: &Digest) -> Result<BlobReader> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(Cursor::new(Vec::new())))
        }
        fn put(
            &self,
            _ctx: &Context,
            _digest: &Digest,
            _size_bytes: i64,
            _reader: BlobReader,
        ) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn delete(&self, _ctx: &Context, _digest: &Digest) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn find_missing(&self, _ctx: &Context, _digests: &[Digest]) -> Result<Vec<Digest>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_rejects_malformed_digests() {
        let backend = Arc::new(CountingStore::default());
        let store = ValidatingStore::new(backend.clone());
        let ctx = Context::new();

        let bad_length = Digest::from_parts("default", vec![0u8; 17], 5);
        let negative = Digest::from_parts("default", vec![0u8; 32], -5);
        let bad_instance = Digest::from_parts("bad|instance", vec![0u8; 32], 5);

        for digest in [&bad_length, &negative, &bad_instance] {
            assert!(matches!(
                store.get(&ctx, digest),
                Err(Error::InvalidArgument(_))
            ));
            assert!(store
                .put(&ctx, digest, 5, Box::new(Cursor::new(Vec::new())))
                .is_err());
            assert!(store.delete(&ctx, digest).is_err());
            assert!(store.find_missing(&ctx, &[(*digest).clone()]).is_err());
        }
        assert_eq!(backend.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_valid_digests_forwarded() {
        let backend = Arc::new(CountingStore::default());
        let store = ValidatingStore::new(backend.clone());
        let ctx = Context::new();
        let digest = Digest::of_bytes("default", HashAlgorithm::Sha256, b"ok");

        store.get(&ctx, &digest).unwrap();
        store
            .put(&ctx, &digest, 2, Box::new(Cursor::new(b"ok".to_vec())))
            .unwrap();
        assert_eq!(backend.calls.load(Ordering::Relaxed), 2);
    }
}
