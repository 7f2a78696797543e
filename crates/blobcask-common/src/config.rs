//! Storage configuration types
//!
//! The configuration grammar is identical for the Content Addressable
//! Storage and the Action Cache: each is described by one
//! [`StoreConfig`] tree, composed of backend leaves (circular, redis,
//! s3, remote) and routing nodes (sharding, size distinguishing).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level blobstore configuration: one backend tree per store kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobstoreConfig {
    pub content_addressable_storage: StoreConfig,
    pub action_cache: StoreConfig,
}

/// A single backend tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-backed circular storage engine
    Circular(CircularConfig),
    /// Weighted sharding across multiple backends
    Sharding(ShardingConfig),
    /// Route small and large blobs to separate backends
    SizeDistinguishing(SizeDistinguishingConfig),
    /// Redis server (network storage layer)
    Redis(RedisConfig),
    /// S3-compatible object store (network storage layer)
    S3(S3Config),
    /// Remote blobcask storage daemon (network storage layer)
    Remote(RemoteConfig),
}

/// Configuration for the circular on-disk engine.
///
/// The engine keeps three files under `directory`: `data` (the ring),
/// `offset` (the digest table) and `state` (the cursor snapshot).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircularConfig {
    /// Directory holding the three storage files
    pub directory: PathBuf,
    /// Capacity of the data ring in bytes
    pub data_file_size_bytes: u64,
    /// Size of the offset table file in bytes; should be at least four
    /// times the expected number of live records times the record size
    pub offset_file_size_bytes: u64,
    /// Probe chain length of the offset table. Values below 2 are
    /// rejected; 8 is a reasonable lower bound for real deployments.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Number of slots in the in-memory offset cache
    #[serde(default)]
    pub offset_cache_size: Option<usize>,
}

/// One shard of a [`ShardingConfig`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Backend serving this shard. Omit to drain the shard: its
    /// traffic redistributes without disturbing other shards' keys.
    #[serde(default)]
    pub backend: Option<Box<StoreConfig>>,
    /// Relative share of the key space owned by this shard
    pub weight: u32,
}

/// Weighted sharding configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardingConfig {
    pub shards: Vec<ShardConfig>,
    /// Seed for the key hash, so adversarial digests cannot target a
    /// single shard. Pick a random 64-bit value per deployment.
    pub hash_initialization: u64,
}

/// Size-distinguishing routing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SizeDistinguishingConfig {
    pub small: Box<StoreConfig>,
    pub large: Box<StoreConfig>,
    /// Blobs of this size or smaller go to `small`
    pub cutoff_size_bytes: i64,
}

/// Redis backend endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedisConfig {
    pub endpoint: String,
    #[serde(default)]
    pub db: i64,
}

/// S3-compatible backend endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub key_prefix: String,
    /// Omit to let the environment supply credentials
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

/// Remote storage daemon address.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub address: String,
}
