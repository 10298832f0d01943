//! # CosmosDB Session Storage
//!
//! An Azure Cosmos DB backend for Shopify OAuth session persistence.
//!
//! ## Features
//!
//! - **One-time initialization**: database and container provisioning runs
//!   exactly once per adapter, with bounded retries, capped exponential
//!   backoff and a per-attempt timeout
//! - **Shared readiness**: every operation awaits the same completion signal;
//!   concurrent callers observe one outcome and provisioning is never
//!   duplicated
//! - **Partition-key resolution**: shard sessions by an arbitrary attribute
//!   via resolver callbacks while keeping point reads working
//! - **Pluggable client**: the Cosmos surface is a trait; a REST client backs
//!   production use and an in-memory client backs tests and examples
//!
//! ## Example
//!
//! ```ignore
//! use shopify_sessions_cosmos::CosmosSessionStorage;
//! use shopify_sessions_core::Session;
//!
//! let storage = CosmosSessionStorage::with_credentials(
//!     "https://my-account.documents.azure.com",
//!     "base64-master-key",
//!     "my_app",
//!     None,
//! )?;
//!
//! storage.store_session(Session::new("sid", "shop.myshopify.com", "state", false)).await?;
//! let session = storage.load_session("sid").await?;
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod init;
pub mod partition;
pub mod storage;

pub use client::{BulkOperation, BulkOperationKind, ClientError, CosmosClient, QuerySpec};
pub use client::{CosmosRestClient, InMemoryCosmosClient};
pub use codec::StoredItem;
pub use config::{ContainerRequest, CosmosStorageOptions, InitializationTuning};
pub use init::Readiness;
pub use partition::PartitionKeyResolver;
pub use storage::CosmosSessionStorage;

// Re-export the contract crate's surface for convenience
pub use shopify_sessions_core::{Result, Session, SessionStorage, SessionStorageError};
