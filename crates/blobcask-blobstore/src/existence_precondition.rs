//! Not-found to failed-precondition remapping
//!
//! The remote execution protocol requires workers to report missing
//! action inputs as a precondition failure carrying a structured
//! violation, so the client knows to re-upload. This adapter performs
//! that translation on the worker read path.

use crate::store::{BlobReader, BlobStore};
use blobcask_common::{Context, Digest, Error, Result, Violation};
use std::sync::Arc;

/// Adapter remapping `NotFound` on reads to `FailedPrecondition` with
/// a `MISSING` violation naming the blob.
pub struct ExistencePreconditionStore {
    inner: Arc<dyn BlobStore>,
}

impl ExistencePreconditionStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self { inner }
    }
}

impl BlobStore for ExistencePreconditionStore {
    fn get(&self, ctx: &Context, digest: &Digest) -> Result<BlobReader> {
        match self.inner.get(ctx, digest) {
            Err(Error::NotFound) => Err(Error::FailedPrecondition {
                message: "blob not found".to_string(),
                violations: vec![Violation {
                    kind: "MISSING".to_string(),
                    subject: format!("blobs/{}/{}", digest.hash_hex(), digest.size_bytes()),
                }],
            }),
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
        self.inner.put(ctx, digest, size_bytes, reader)
    }

    fn delete(&self, ctx: &Context, digest: &Digest) -> Result<()> {
        self.inner.delete(ctx, digest)
    }

    fn find_missing(&self, ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
        self.inner.find_missing(ctx, digests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobcask_common::HashAlgorithm;
    use std::io::Cursor;

    struct FixedStore(fn() -> Result<BlobReader>);

    impl BlobStore for FixedStore {
        fn get(&self, _ctx: &Context, _digest: &Digest) -> Result<BlobReader> {
            (self.0)()
        }
        fn put(
            &self,
            _ctx: &Context,
            _digest: &Digest,
            _size_bytes: i64,
            _reader: BlobReader,
        ) -> Result<()> {
            Ok(())
        }
        fn delete(&self, _ctx: &Context, _digest: &Digest) -> Result<()> {
            Ok(())
        }
        fn find_missing(&self, _ctx: &Context, digests: &[Digest]) -> Result<Vec<Digest>> {
            Ok(digests.to_vec())
        }
    }

    #[test]
    fn test_not_found_remapped_with_violation() {
        let store = ExistencePreconditionStore::new(Arc::new(FixedStore(|| Err(Error::NotFound))));
        let digest = Digest::of_bytes("default", HashAlgorithm::Sha256, b"hello");

        match store.get(&Context::new(), &digest) {
            Err(Error::FailedPrecondition { violations, .. }) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].kind, "MISSING");
                assert_eq!(
                    violations[0].subject,
                    format!("blobs/{}/5", digest.hash_hex())
                );
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_other_errors_pass_through() {
        let store =
            ExistencePreconditionStore::new(Arc::new(FixedStore(|| Err(Error::internal("io")))));
        let digest = Digest::of_bytes("default", HashAlgorithm::Sha256, b"hello");
        assert!(matches!(
            store.get(&Context::new(), &digest),
            Err(Error::Internal(_))
        ));
    }

    #[test]
    fn test_success_passes_through() {
        let store = ExistencePreconditionStore::new(Arc::new(FixedStore(|| {
            Ok(Box::new(Cursor::new(b"ok".to_vec())) as BlobReader)
        })));
        let digest = Digest::of_bytes("default", HashAlgorithm::Sha256, b"ok");
        assert!(store.get(&Context::new(), &digest).is_ok());
    }
}
