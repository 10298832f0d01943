// Adapter configuration
//
// Recognized options mirror the upstream package: container name,
// container request (partition key path), and the two partition-key
// resolver callbacks. Initialization tuning is exposed alongside so the
// retry schedule can be tightened in tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use shopify_sessions_core::{Result, SessionStorageError};

/// Default container name for session documents
pub const DEFAULT_CONTAINER_NAME: &str = "shopify_sessions";

/// Default partition key path; the session id partitions its own document
pub const DEFAULT_PARTITION_KEY_PATH: &str = "/id";

/// Maximum number of retries after the first initialization attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-attempt initialization deadline
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// First backoff delay of the capped exponential schedule
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on the backoff delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(5_000);

/// A partition-key resolver callback
///
/// Maps a session id (or shop) to the partition key value its document
/// lives under. Must be deterministic: the key used to write a session
/// has to be recoverable from the id alone on later reads.
pub type PartitionKeyFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Container provisioning request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    /// Partition key path of the container, e.g. `/id` or `/shop`
    pub partition_key_path: String,
}

impl Default for ContainerRequest {
    fn default() -> Self {
        Self {
            partition_key_path: DEFAULT_PARTITION_KEY_PATH.to_string(),
        }
    }
}

/// Retry/backoff/timeout schedule for the initialization supervisor
///
/// Delay before retry *n* (0-indexed) is `min(base_delay * 2^n, max_delay)`.
/// With the defaults the schedule is 500 ms, 1 s, 2 s before giving up
/// after the fourth attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializationTuning {
    /// Deadline for a single provisioning attempt
    pub attempt_timeout: Duration,

    /// First backoff delay
    pub base_delay: Duration,

    /// Cap on the backoff delay
    pub max_delay: Duration,

    /// Retries allowed after the first attempt
    pub max_retries: u32,
}

impl Default for InitializationTuning {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl InitializationTuning {
    /// Set the per-attempt deadline
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the first backoff delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff cap
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the number of retries allowed after the first attempt
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Backoff delay inserted after failed attempt *n* (0-indexed)
    pub fn delay_for_retry(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Options accepted by every [`CosmosSessionStorage`] constructor
///
/// [`CosmosSessionStorage`]: crate::storage::CosmosSessionStorage
#[derive(Clone, Default)]
pub struct CosmosStorageOptions {
    /// Name of the container holding session documents
    pub container_name: Option<String>,

    /// Container provisioning request
    pub container_request: ContainerRequest,

    /// Resolver from session id to partition key; required for any
    /// non-default partition key path
    pub partition_key_by_id: Option<PartitionKeyFn>,

    /// Resolver from shop to partition key; required for any non-default
    /// partition key path
    pub partition_key_by_shop: Option<PartitionKeyFn>,

    /// Initialization retry schedule
    pub init: InitializationTuning,
}

impl CosmosStorageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container name
    pub fn with_container_name(mut self, name: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self
    }

    /// Set the container partition key path
    pub fn with_partition_key_path(mut self, path: impl Into<String>) -> Self {
        self.container_request.partition_key_path = path.into();
        self
    }

    /// Set the id-to-partition-key resolver
    pub fn with_partition_key_by_id<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.partition_key_by_id = Some(Arc::new(resolver));
        self
    }

    /// Set the shop-to-partition-key resolver
    pub fn with_partition_key_by_shop<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.partition_key_by_shop = Some(Arc::new(resolver));
        self
    }

    /// Set the initialization retry schedule
    pub fn with_init_tuning(mut self, tuning: InitializationTuning) -> Self {
        self.init = tuning;
        self
    }

    /// Effective container name
    pub fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or(DEFAULT_CONTAINER_NAME)
    }
}

impl fmt::Debug for CosmosStorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosmosStorageOptions")
            .field("container_name", &self.container_name())
            .field("container_request", &self.container_request)
            .field("partition_key_by_id", &self.partition_key_by_id.is_some())
            .field("partition_key_by_shop", &self.partition_key_by_shop.is_some())
            .field("init", &self.init)
            .finish()
    }
}

/// Account credentials extracted from a connection descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccountCredentials {
    pub endpoint: String,
    pub key: String,
}

/// Parse an `AccountEndpoint=...;AccountKey=...` connection string
pub(crate) fn parse_connection_string(connection_string: &str) -> Result<AccountCredentials> {
    if connection_string.trim().is_empty() {
        return Err(SessionStorageError::config(
            "no connection string or client provided",
        ));
    }

    let mut endpoint = None;
    let mut key = None;
    for segment in connection_string.split(';') {
        let Some((name, value)) = segment.split_once('=') else {
            continue;
        };
        match name.trim() {
            "AccountEndpoint" => endpoint = Some(value.trim().to_string()),
            // The account key is base64 and may itself contain '='; only the
            // first '=' separates the name from the value
            "AccountKey" => key = Some(value.trim().to_string()),
            _ => {}
        }
    }

    match (endpoint, key) {
        (Some(endpoint), Some(key)) if !endpoint.is_empty() && !key.is_empty() => {
            Ok(AccountCredentials { endpoint, key })
        }
        _ => Err(SessionStorageError::config(
            "connection string is missing AccountEndpoint or AccountKey",
        )),
    }
}
