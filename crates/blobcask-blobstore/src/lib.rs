//! Blobcask Blobstore - Composable content-addressable storage
//!
//! This crate implements the blob storage stack for blobcask:
//! - The [`BlobStore`] capability trait every layer implements
//! - The circular on-disk storage engine (bounded, self-compacting,
//!   crash tolerant)
//! - Weighted sharding across backends with drain support
//! - Policy adapters: size distinguishing, read caching, empty-blob
//!   filtering
//! - Contract adapters: checksum validation, digest validation,
//!   existence precondition remapping, metrics
//! - Configuration-driven construction of complete store stacks

pub mod circular;
pub mod configuration;
pub mod empty_blob;
pub mod existence_precondition;
pub mod merkle;
pub mod metrics;
pub mod read_caching;
pub mod sharding;
pub mod size_distinguishing;
pub mod store;
pub mod validation;

// Re-exports
pub use circular::CircularBlobStore;
pub use configuration::{create_blob_stores, BlobStores};
pub use empty_blob::EmptyBlobFilteringStore;
pub use existence_precondition::ExistencePreconditionStore;
pub use merkle::MerkleValidatingStore;
pub use metrics::{registry, MetricsBlobStore, MetricsRegistry, StoreOperation};
pub use read_caching::ReadCachingStore;
pub use sharding::{ShardPermuter, ShardingBlobStore, WeightedShardPermuter};
pub use size_distinguishing::SizeDistinguishingStore;
pub use store::{BlobReader, BlobStore};
pub use validation::ValidatingStore;
