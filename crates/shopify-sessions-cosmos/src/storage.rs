// Cosmos-backed session storage
//
// The public surface of the adapter. Construction validates the
// connection configuration synchronously, builds the client once, and
// starts the initialization supervisor; every operation awaits the
// shared readiness signal before touching storage.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use shopify_sessions_core::{Result, Session, SessionStorage, SessionStorageError};

use crate::client::{BulkOperation, ClientError, CosmosClient, CosmosRestClient, QuerySpec};
use crate::codec;
use crate::config::{self, CosmosStorageOptions};
use crate::init::{self, Readiness};
use crate::partition::PartitionKeyResolver;

/// Session storage backed by an Azure Cosmos DB container
///
/// The container and its database are provisioned lazily by a one-time
/// initialization sequence started at construction; see
/// [`CosmosStorageOptions`] for the partition-key and retry knobs.
///
/// Constructors must run inside a Tokio runtime, since they start the
/// initialization supervisor.
pub struct CosmosSessionStorage {
    client: Arc<dyn CosmosClient>,
    db_name: String,
    container_name: String,
    resolver: PartitionKeyResolver,
    ready: Readiness,
}

impl CosmosSessionStorage {
    /// Construct against an account endpoint and master key
    pub fn with_credentials(
        endpoint: &str,
        key: &str,
        db_name: &str,
        options: Option<CosmosStorageOptions>,
    ) -> Result<Self> {
        let client = CosmosRestClient::new(endpoint, key)?;
        Self::from_client(Arc::new(client), db_name, options)
    }

    /// Construct from an `AccountEndpoint=...;AccountKey=...` connection string
    pub fn with_connection_string(
        connection_string: &str,
        db_name: &str,
        options: Option<CosmosStorageOptions>,
    ) -> Result<Self> {
        let credentials = config::parse_connection_string(connection_string)?;
        let client = CosmosRestClient::new(&credentials.endpoint, &credentials.key)?;
        Self::from_client(Arc::new(client), db_name, options)
    }

    /// Construct over a pre-built document client
    pub fn with_client(
        client: Arc<dyn CosmosClient>,
        db_name: &str,
        options: Option<CosmosStorageOptions>,
    ) -> Result<Self> {
        Self::from_client(client, db_name, options)
    }

    fn from_client(
        client: Arc<dyn CosmosClient>,
        db_name: &str,
        options: Option<CosmosStorageOptions>,
    ) -> Result<Self> {
        if db_name.trim().is_empty() {
            return Err(SessionStorageError::config("database name must not be empty"));
        }

        let options = options.unwrap_or_default();
        let container_name = options.container_name().to_string();
        let resolver = PartitionKeyResolver::from_options(&options);

        let ready = init::spawn_initialization(
            client.clone(),
            db_name.to_string(),
            container_name.clone(),
            options.container_request.partition_key_path.clone(),
            options.init.clone(),
        );

        Ok(Self {
            client,
            db_name: db_name.to_string(),
            container_name,
            resolver,
            ready,
        })
    }

    /// Outcome of the one-time initialization sequence
    ///
    /// Operations await this internally; exposed so hosts can surface
    /// startup failures eagerly instead of on first use.
    pub async fn ready(&self) -> Result<()> {
        self.ready.wait().await
    }

    /// Store a session, replacing any existing one with the same id
    pub async fn store_session(&self, session: &Session) -> Result<()> {
        self.ready.wait().await?;

        let item = codec::encode_session(session, &self.resolver)?;
        let partition_key = match item.partition_key.clone() {
            Some(key) => key,
            None => self.resolver.resolve_by_id(&session.id)?,
        };

        debug!(id = %session.id, shop = %session.shop, "storing session");
        self.client
            .upsert_item(&self.db_name, &self.container_name, item.document, &partition_key)
            .await
            .map_err(into_storage_error)
    }

    /// Load the session with the given id; `Ok(None)` when absent
    pub async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        self.ready.wait().await?;

        let partition_key = self.resolver.resolve_by_id(id)?;
        let document = self
            .client
            .read_item(&self.db_name, &self.container_name, id, &partition_key)
            .await
            .map_err(into_storage_error)?;

        document.map(codec::decode_item).transpose()
    }

    /// Delete the session with the given id; missing ids succeed
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.ready.wait().await?;

        let partition_key = self.resolver.resolve_by_id(id)?;
        let existing = self
            .client
            .read_item(&self.db_name, &self.container_name, id, &partition_key)
            .await
            .map_err(into_storage_error)?;
        if existing.is_none() {
            return Ok(());
        }

        self.client
            .delete_item(&self.db_name, &self.container_name, id, &partition_key)
            .await
            .map_err(into_storage_error)
    }

    /// Delete a batch of sessions in one bulk submission
    pub async fn delete_sessions(&self, ids: &[String]) -> Result<()> {
        self.ready.wait().await?;

        let operations = ids
            .iter()
            .map(|id| {
                Ok(BulkOperation::delete(
                    id.clone(),
                    self.resolver.resolve_by_id(id)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = operations.len(), "bulk-deleting sessions");
        self.client
            .bulk(&self.db_name, &self.container_name, operations)
            .await
            .map_err(into_storage_error)
    }

    /// Find every session whose shop attribute equals the given shop
    pub async fn find_sessions_by_shop(&self, shop: &str) -> Result<Vec<Session>> {
        self.ready.wait().await?;

        let partition_key = self.resolver.resolve_by_shop(shop)?;
        let query = QuerySpec::new("SELECT * FROM Sessions c WHERE c.shop = @shop")
            .with_parameter("@shop", json!(shop));

        let documents = self
            .client
            .query_items(
                &self.db_name,
                &self.container_name,
                query,
                partition_key.as_deref(),
            )
            .await
            .map_err(into_storage_error)?;

        documents.into_iter().map(codec::decode_item).collect()
    }

    /// Release the underlying client's resources
    ///
    /// Callers must make sure no operations are in flight; repeated
    /// disconnects are harmless.
    pub async fn disconnect(&self) {
        self.client.dispose().await;
    }
}

#[async_trait]
impl SessionStorage for CosmosSessionStorage {
    async fn store_session(&self, session: Session) -> Result<()> {
        CosmosSessionStorage::store_session(self, &session).await
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>> {
        CosmosSessionStorage::load_session(self, id).await
    }

    async fn delete_session(&self, id: &str) -> Result<()> {
        CosmosSessionStorage::delete_session(self, id).await
    }

    async fn delete_sessions(&self, ids: &[String]) -> Result<()> {
        CosmosSessionStorage::delete_sessions(self, ids).await
    }

    async fn find_sessions_by_shop(&self, shop: &str) -> Result<Vec<Session>> {
        CosmosSessionStorage::find_sessions_by_shop(self, shop).await
    }
}

fn into_storage_error(error: ClientError) -> SessionStorageError {
    if error.is_auth() {
        SessionStorageError::auth(error.to_string())
    } else {
        SessionStorageError::backend(error.status(), error.to_string())
    }
}

impl std::fmt::Debug for CosmosSessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosSessionStorage")
            .field("db_name", &self.db_name)
            .field("container_name", &self.container_name)
            .field("resolver", &self.resolver)
            .field("ready", &self.ready)
            .finish()
    }
}
