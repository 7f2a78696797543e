//! Configuration-driven store construction
//!
//! Builds the Content Addressable Storage and Action Cache stacks
//! from a [`BlobstoreConfig`]. Every backend is wrapped in a metrics
//! layer named `<kind>_<backend>`; the CAS additionally gets a
//! mandatory checksum validation layer to protect against data
//! corruption, reported as `cas_merkle`.

use crate::circular::{
    CachingOffsetStore, CircularBlobStore, FileDataStore, FileOffsetStore, FileStateStore,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_STATE_FLUSH_INTERVAL,
};
use crate::merkle::MerkleValidatingStore;
use crate::metrics::MetricsBlobStore;
use crate::sharding::ShardingBlobStore;
use crate::size_distinguishing::SizeDistinguishingStore;
use crate::store::BlobStore;
use blobcask_common::{
    BlobstoreConfig, CircularConfig, DigestKeyFormat, Error, Result, StoreConfig,
};
use std::fs::OpenOptions;
use std::sync::Arc;

/// Default slot count of the in-memory offset cache
const DEFAULT_OFFSET_CACHE_SIZE: usize = 16 * 1024;

/// The two store stacks serving a storage node.
pub struct BlobStores {
    pub content_addressable_storage: Arc<dyn BlobStore>,
    pub action_cache: Arc<dyn BlobStore>,
}

/// Build the CAS and Action Cache stacks from configuration.
///
/// The CAS is keyed without the instance name, so identical blobs
/// merge across instances; the Action Cache is keyed with it.
pub fn create_blob_stores(config: &BlobstoreConfig) -> Result<BlobStores> {
    let cas = create_store(
        &config.content_addressable_storage,
        "cas",
        DigestKeyFormat::WithoutInstance,
    )?;
    let action_cache = create_store(&config.action_cache, "ac", DigestKeyFormat::WithInstance)?;

    // Mandatory corruption protection on top of the CAS.
    let cas = Arc::new(MetricsBlobStore::new(
        Arc::new(MerkleValidatingStore::new(cas)),
        "cas_merkle",
    ));

    Ok(BlobStores {
        content_addressable_storage: cas,
        action_cache,
    })
}

fn create_circular(config: &CircularConfig) -> Result<CircularBlobStore> {
    std::fs::create_dir_all(&config.directory)?;
    let open = |name: &str| -> Result<std::fs::File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(config.directory.join(name))?)
    };

    let offset_store = FileOffsetStore::new(
        open("offset")?,
        config.offset_file_size_bytes,
        config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
    )?;
    let offset_store = CachingOffsetStore::new(
        offset_store,
        config.offset_cache_size.unwrap_or(DEFAULT_OFFSET_CACHE_SIZE),
    );
    CircularBlobStore::new(
        Box::new(offset_store),
        Arc::new(FileDataStore::new(open("data")?, config.data_file_size_bytes)),
        config.data_file_size_bytes,
        Arc::new(FileStateStore::new(open("state")?)),
        DEFAULT_STATE_FLUSH_INTERVAL,
    )
}

fn create_store(
    config: &StoreConfig,
    kind: &str,
    key_format: DigestKeyFormat,
) -> Result<Arc<dyn BlobStore>> {
    let (implementation, backend_type): (Arc<dyn BlobStore>, &str) = match config {
        StoreConfig::Circular(circular) => {
            if circular.data_file_size_bytes == 0 {
                return Err(Error::configuration("circular data file size is zero"));
            }
            (Arc::new(create_circular(circular)?), "circular")
        }
        StoreConfig::Sharding(sharding) => {
            let mut backends = Vec::with_capacity(sharding.shards.len());
            let mut weights = Vec::with_capacity(sharding.shards.len());
            for shard in &sharding.shards {
                backends.push(match &shard.backend {
                    Some(backend) => Some(create_store(backend, kind, key_format)?),
                    None => None,
                });
                weights.push(shard.weight);
            }
            (
                Arc::new(ShardingBlobStore::new(
                    backends,
                    &weights,
                    key_format,
                    sharding.hash_initialization,
                )?),
                "sharding",
            )
        }
        StoreConfig::SizeDistinguishing(sd) => {
            let small = create_store(&sd.small, kind, key_format)?;
            let large = create_store(&sd.large, kind, key_format)?;
            (
                Arc::new(SizeDistinguishingStore::new(small, large, sd.cutoff_size_bytes)),
                "size_distinguishing",
            )
        }
        StoreConfig::Redis(_) => {
            return Err(Error::configuration(
                "redis backend requires the network storage layer, which this build does not carry",
            ));
        }
        StoreConfig::S3(_) => {
            return Err(Error::configuration(
                "s3 backend requires the network storage layer, which this build does not carry",
            ));
        }
        StoreConfig::Remote(_) => {
            return Err(Error::configuration(
                "remote backend requires the network storage layer, which this build does not carry",
            ));
        }
    };

    Ok(Arc::new(MetricsBlobStore::new(
        implementation,
        &format!("{kind}_{backend_type}"),
    )))
}
