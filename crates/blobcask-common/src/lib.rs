//! Blobcask Common - Shared types and utilities
//!
//! This crate provides the types shared by every blobcask component:
//! error definitions, the blob digest model, operation contexts and
//! storage configuration.

pub mod config;
pub mod context;
pub mod digest;
pub mod error;

pub use config::{
    BlobstoreConfig, CircularConfig, RedisConfig, RemoteConfig, S3Config, ShardConfig,
    ShardingConfig, SizeDistinguishingConfig, StoreConfig,
};
pub use context::Context;
pub use digest::{Digest, DigestKeyFormat, HashAlgorithm};
pub use error::{Error, Result, Violation};
