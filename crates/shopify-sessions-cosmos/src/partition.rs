// Partition key resolution
//
// Pure mapping from a session id or shop value to the partition key its
// document is routed under. A configured callback always wins; without
// one, the default `/id` path makes the id its own partition key, and
// any other path is a configuration error.

use shopify_sessions_core::{Result, SessionStorageError};

use crate::config::{CosmosStorageOptions, PartitionKeyFn, DEFAULT_PARTITION_KEY_PATH};

/// Resolves partition keys for point lookups and shop queries
#[derive(Clone)]
pub struct PartitionKeyResolver {
    path: String,
    by_id: Option<PartitionKeyFn>,
    by_shop: Option<PartitionKeyFn>,
}

impl PartitionKeyResolver {
    pub(crate) fn from_options(options: &CosmosStorageOptions) -> Self {
        Self {
            path: options.container_request.partition_key_path.clone(),
            by_id: options.partition_key_by_id.clone(),
            by_shop: options.partition_key_by_shop.clone(),
        }
    }

    /// Whether the container is partitioned on the default `/id` path
    pub fn is_default_path(&self) -> bool {
        self.path == DEFAULT_PARTITION_KEY_PATH
    }

    /// The document attribute named by the partition key path, with the
    /// leading separator stripped
    pub fn attribute_name(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }

    /// Partition key for the session with the given id
    pub fn resolve_by_id(&self, id: &str) -> Result<String> {
        if let Some(resolve) = &self.by_id {
            return Ok(resolve(id));
        }
        if self.is_default_path() {
            return Ok(id.to_string());
        }
        Err(SessionStorageError::PartitionKeyById)
    }

    /// Partition key constraint for a shop query
    ///
    /// `Ok(None)` means no constraint: the query runs unscoped across
    /// partitions.
    pub fn resolve_by_shop(&self, shop: &str) -> Result<Option<String>> {
        if let Some(resolve) = &self.by_shop {
            return Ok(Some(resolve(shop)));
        }
        if self.is_default_path() {
            return Ok(None);
        }
        Err(SessionStorageError::PartitionKeyByShop)
    }
}

impl std::fmt::Debug for PartitionKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionKeyResolver")
            .field("path", &self.path)
            .field("by_id", &self.by_id.is_some())
            .field("by_shop", &self.by_shop.is_some())
            .finish()
    }
}
