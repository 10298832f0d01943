// Document client seam
//
// The adapter talks to Cosmos through this trait so the transport is
// pluggable:
// - CosmosRestClient speaks the Cosmos REST API over HTTPS
// - InMemoryCosmosClient backs tests and examples

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

mod memory;
mod rest;

pub use memory::InMemoryCosmosClient;
pub use rest::CosmosRestClient;

/// Errors reported by a document client
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The backend rejected the account credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The backend answered with a non-success status
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether this is an authentication-class failure; these are never
    /// retried by the initialization supervisor
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }

    /// Status code carried by the failure, when the backend reported one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Kind of a batched operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperationKind {
    Delete,
}

/// One entry of a bulk submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOperation {
    pub id: String,
    pub kind: BulkOperationKind,
    pub partition_key: String,
}

impl BulkOperation {
    /// A batched delete of the item with the given id
    pub fn delete(id: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: BulkOperationKind::Delete,
            partition_key: partition_key.into(),
        }
    }
}

/// A parameterized query
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub query: String,
    pub parameters: Vec<QueryParameter>,
}

/// A named query parameter, e.g. `@shop`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParameter {
    pub name: String,
    pub value: Value,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Bind a parameter
    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push(QueryParameter {
            name: name.into(),
            value,
        });
        self
    }
}

/// The document-database surface the adapter consumes
///
/// Implementations must be thread-safe; the adapter issues concurrent
/// independent requests through one shared client.
#[async_trait]
pub trait CosmosClient: Send + Sync {
    /// Ensure the database exists; creating an existing database succeeds
    async fn create_database_if_not_exists(&self, db_name: &str) -> Result<(), ClientError>;

    /// Ensure the container exists with the given partition key path;
    /// creating an existing container succeeds
    async fn create_container_if_not_exists(
        &self,
        db_name: &str,
        container_name: &str,
        partition_key_path: &str,
    ) -> Result<(), ClientError>;

    /// Insert or replace the document with the given partition key
    async fn upsert_item(
        &self,
        db_name: &str,
        container_name: &str,
        document: Map<String, Value>,
        partition_key: &str,
    ) -> Result<(), ClientError>;

    /// Point-read a document; `Ok(None)` when no such item exists
    async fn read_item(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Map<String, Value>>, ClientError>;

    /// Delete a document; deleting a missing item is not an error
    async fn delete_item(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<(), ClientError>;

    /// Submit a batch of operations as one request
    async fn bulk(
        &self,
        db_name: &str,
        container_name: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<(), ClientError>;

    /// Run a parameterized query, optionally scoped to one partition
    async fn query_items(
        &self,
        db_name: &str,
        container_name: &str,
        query: QuerySpec,
        partition_key: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, ClientError>;

    /// Release the client's resources; idempotent
    async fn dispose(&self);
}
