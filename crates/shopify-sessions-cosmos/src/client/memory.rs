// In-memory implementation of the document client
//
// Primarily for testing. It provisions databases and containers in
// process and gives the same answers the REST backend would for the
// request shapes the adapter issues, including partition-key agreement
// on point reads and the single-equality query filter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{BulkOperation, BulkOperationKind, ClientError, CosmosClient, QuerySpec};

struct ContainerState {
    partition_key_path: String,
    items: HashMap<String, Map<String, Value>>,
}

impl ContainerState {
    /// Partition key value a stored document carries, per this
    /// container's partition key path
    fn item_partition_key<'a>(&self, document: &'a Map<String, Value>) -> Option<&'a str> {
        let attribute = self
            .partition_key_path
            .strip_prefix('/')
            .unwrap_or(&self.partition_key_path);
        document.get(attribute).and_then(Value::as_str)
    }
}

/// In-memory document client
///
/// # Example
///
/// ```
/// use shopify_sessions_cosmos::InMemoryCosmosClient;
///
/// let client = InMemoryCosmosClient::new();
/// ```
#[derive(Default)]
pub struct InMemoryCosmosClient {
    databases: RwLock<HashMap<String, HashMap<String, ContainerState>>>,
    disposed: AtomicBool,
}

impl InMemoryCosmosClient {
    /// Create an empty client
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items in a container, for assertions in tests
    pub fn item_count(&self, db_name: &str, container_name: &str) -> usize {
        self.databases
            .read()
            .get(db_name)
            .and_then(|containers| containers.get(container_name))
            .map_or(0, |container| container.items.len())
    }

    /// Whether `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Relaxed)
    }

    fn with_container<T>(
        &self,
        db_name: &str,
        container_name: &str,
        f: impl FnOnce(&mut ContainerState) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        let mut databases = self.databases.write();
        let container = databases
            .get_mut(db_name)
            .and_then(|containers| containers.get_mut(container_name))
            .ok_or_else(|| ClientError::Http {
                status: 404,
                message: format!("container '{db_name}/{container_name}' does not exist"),
            })?;
        f(container)
    }
}

#[async_trait]
impl CosmosClient for InMemoryCosmosClient {
    async fn create_database_if_not_exists(&self, db_name: &str) -> Result<(), ClientError> {
        self.databases
            .write()
            .entry(db_name.to_string())
            .or_default();
        Ok(())
    }

    async fn create_container_if_not_exists(
        &self,
        db_name: &str,
        container_name: &str,
        partition_key_path: &str,
    ) -> Result<(), ClientError> {
        let mut databases = self.databases.write();
        let containers = databases.get_mut(db_name).ok_or_else(|| ClientError::Http {
            status: 404,
            message: format!("database '{db_name}' does not exist"),
        })?;
        containers
            .entry(container_name.to_string())
            .or_insert_with(|| ContainerState {
                partition_key_path: partition_key_path.to_string(),
                items: HashMap::new(),
            });
        Ok(())
    }

    async fn upsert_item(
        &self,
        db_name: &str,
        container_name: &str,
        document: Map<String, Value>,
        _partition_key: &str,
    ) -> Result<(), ClientError> {
        self.with_container(db_name, container_name, |container| {
            let id = document
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| ClientError::Http {
                    status: 400,
                    message: "document has no id".to_string(),
                })?
                .to_string();
            container.items.insert(id, document);
            Ok(())
        })
    }

    async fn read_item(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Map<String, Value>>, ClientError> {
        self.with_container(db_name, container_name, |container| {
            let Some(document) = container.items.get(id) else {
                return Ok(None);
            };
            // A point read only answers within its partition
            if let Some(stored) = container.item_partition_key(document) {
                if stored != partition_key {
                    return Ok(None);
                }
            }
            Ok(Some(document.clone()))
        })
    }

    async fn delete_item(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        _partition_key: &str,
    ) -> Result<(), ClientError> {
        self.with_container(db_name, container_name, |container| {
            container.items.remove(id);
            Ok(())
        })
    }

    async fn bulk(
        &self,
        db_name: &str,
        container_name: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<(), ClientError> {
        self.with_container(db_name, container_name, |container| {
            for operation in operations {
                match operation.kind {
                    BulkOperationKind::Delete => {
                        container.items.remove(&operation.id);
                    }
                }
            }
            Ok(())
        })
    }

    async fn query_items(
        &self,
        db_name: &str,
        container_name: &str,
        query: QuerySpec,
        partition_key: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, ClientError> {
        let filter = parse_equality_filter(&query)?;

        self.with_container(db_name, container_name, |container| {
            let mut results: Vec<Map<String, Value>> = container
                .items
                .values()
                .filter(|document| {
                    if let Some(key) = partition_key {
                        if container.item_partition_key(document) != Some(key) {
                            return false;
                        }
                    }
                    match &filter {
                        Some((attribute, value)) => document.get(attribute) == Some(value),
                        None => true,
                    }
                })
                .cloned()
                .collect();
            // HashMap order is arbitrary; stable output keeps assertions simple
            results.sort_by(|a, b| {
                let a = a.get("id").and_then(Value::as_str).unwrap_or_default();
                let b = b.get("id").and_then(Value::as_str).unwrap_or_default();
                a.cmp(b)
            });
            Ok(results)
        })
    }

    async fn dispose(&self) {
        self.disposed.store(true, Ordering::Relaxed);
    }
}

/// Evaluate the one query shape the adapter issues:
/// `SELECT * FROM <alias> c WHERE c.<attribute> = @<parameter>`
fn parse_equality_filter(query: &QuerySpec) -> Result<Option<(String, Value)>, ClientError> {
    let Some((_, clause)) = query.query.split_once("WHERE") else {
        return Ok(None);
    };

    let unsupported = || ClientError::Http {
        status: 400,
        message: format!("unsupported query: {}", query.query),
    };

    let (lhs, rhs) = clause.split_once('=').ok_or_else(unsupported)?;
    let attribute = lhs
        .trim()
        .strip_prefix("c.")
        .ok_or_else(unsupported)?
        .to_string();
    let parameter = rhs.trim();

    let value = query
        .parameters
        .iter()
        .find(|p| p.name == parameter)
        .map(|p| p.value.clone())
        .ok_or_else(unsupported)?;

    Ok(Some((attribute, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(id: &str, shop: &str) -> Map<String, Value> {
        let Value::Object(map) = json!({"id": id, "shop": shop, "state": "s", "isOnline": false})
        else {
            unreachable!()
        };
        map
    }

    async fn provisioned() -> InMemoryCosmosClient {
        let client = InMemoryCosmosClient::new();
        client.create_database_if_not_exists("db").await.unwrap();
        client
            .create_container_if_not_exists("db", "sessions", "/id")
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn test_operations_require_provisioning() {
        let client = InMemoryCosmosClient::new();
        let err = client
            .read_item("db", "sessions", "sid", "sid")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_upsert_and_point_read() {
        let client = provisioned().await;
        client
            .upsert_item("db", "sessions", document("sid", "shop"), "sid")
            .await
            .unwrap();

        let read = client.read_item("db", "sessions", "sid", "sid").await.unwrap();
        assert_eq!(read.unwrap()["shop"], json!("shop"));

        // Wrong partition: no answer
        let read = client.read_item("db", "sessions", "sid", "other").await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_query_filters_by_parameter() {
        let client = provisioned().await;
        for (id, shop) in [("a", "shop-1"), ("b", "shop-2"), ("c", "shop-1")] {
            client
                .upsert_item("db", "sessions", document(id, shop), id)
                .await
                .unwrap();
        }

        let spec = QuerySpec::new("SELECT * FROM Sessions c WHERE c.shop = @shop")
            .with_parameter("@shop", json!("shop-1"));
        let results = client.query_items("db", "sessions", spec, None).await.unwrap();

        let ids: Vec<_> = results
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_bulk_delete_removes_listed_ids() {
        let client = provisioned().await;
        for id in ["a", "b", "c"] {
            client
                .upsert_item("db", "sessions", document(id, "shop"), id)
                .await
                .unwrap();
        }

        client
            .bulk(
                "db",
                "sessions",
                vec![
                    BulkOperation::delete("a", "a"),
                    BulkOperation::delete("c", "c"),
                    BulkOperation::delete("missing", "missing"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(client.item_count("db", "sessions"), 1);
    }
}
