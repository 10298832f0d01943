// Cosmos REST API implementation of the document client
//
// Speaks the documented HTTPS surface directly: master-key request
// signing (HMAC-SHA256 over verb, resource type, resource link and the
// request date), create-if-not-exists via 409 tolerance, point reads and
// deletes by document link, and parameterized queries.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;

use shopify_sessions_core::SessionStorageError;

use super::{BulkOperation, BulkOperationKind, ClientError, CosmosClient, QuerySpec};

const API_VERSION: &str = "2018-12-31";

/// Document client backed by the Cosmos DB REST API
///
/// Construction only validates and decodes the credentials; nothing goes
/// over the wire until the first request.
pub struct CosmosRestClient {
    http: reqwest::Client,
    endpoint: String,
    key: Vec<u8>,
}

impl CosmosRestClient {
    /// Create a client for the given account endpoint and master key
    pub fn new(endpoint: &str, key: &str) -> shopify_sessions_core::Result<Self> {
        let endpoint = endpoint.trim();
        let key = key.trim();
        if endpoint.is_empty() || key.is_empty() {
            return Err(SessionStorageError::config(
                "no connection string or client provided",
            ));
        }

        let key = BASE64
            .decode(key)
            .map_err(|_| SessionStorageError::config("account key is not valid base64"))?;

        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key,
        })
    }

    /// Master-key authorization token for one request
    fn auth_token(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> Result<String, ClientError> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type,
            resource_link,
            date.to_lowercase()
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| ClientError::Transport(format!("signing key rejected: {e}")))?;
        mac.update(payload.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        Ok(urlencoding::encode(&format!("type=master&ver=1.0&sig={signature}")).into_owned())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        resource_type: &str,
        resource_link: &str,
        headers: Vec<(&'static str, String)>,
        body: Option<Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let token = self.auth_token(method.as_str(), resource_type, resource_link, &date)?;

        let mut request = self
            .http
            .request(method, format!("{}/{}", self.endpoint, path))
            .header("authorization", token)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            let body = serde_json::to_string(&body)
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            request = request.body(body);
        }

        request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn failure(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        if status == 401 || status == 403 {
            ClientError::Unauthorized(message)
        } else {
            ClientError::Http { status, message }
        }
    }

    /// JSON array header value scoping a request to one partition
    fn partition_header(partition_key: &str) -> String {
        json!([partition_key]).to_string()
    }

    async fn delete_one(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<(), ClientError> {
        let link = format!("dbs/{db_name}/colls/{container_name}/docs/{id}");
        let response = self
            .send(
                Method::DELETE,
                &link,
                "docs",
                &link,
                vec![(
                    "x-ms-documentdb-partitionkey",
                    Self::partition_header(partition_key),
                )],
                None,
            )
            .await?;

        match response.status().as_u16() {
            // Deleting a missing document counts as deleted
            200..=299 | 404 => Ok(()),
            _ => Err(Self::failure(response).await),
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(rename = "Documents", default)]
    documents: Vec<Map<String, Value>>,
}

#[async_trait]
impl CosmosClient for CosmosRestClient {
    async fn create_database_if_not_exists(&self, db_name: &str) -> Result<(), ClientError> {
        let response = self
            .send(
                Method::POST,
                "dbs",
                "dbs",
                "",
                vec![("content-type", "application/json".to_string())],
                Some(json!({ "id": db_name })),
            )
            .await?;

        match response.status().as_u16() {
            // 409: the database already exists
            200..=299 | 409 => Ok(()),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn create_container_if_not_exists(
        &self,
        db_name: &str,
        container_name: &str,
        partition_key_path: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .send(
                Method::POST,
                &format!("dbs/{db_name}/colls"),
                "colls",
                &format!("dbs/{db_name}"),
                vec![("content-type", "application/json".to_string())],
                Some(json!({
                    "id": container_name,
                    "partitionKey": { "paths": [partition_key_path], "kind": "Hash" },
                })),
            )
            .await?;

        match response.status().as_u16() {
            200..=299 | 409 => Ok(()),
            _ => Err(Self::failure(response).await),
        }
    }

    async fn upsert_item(
        &self,
        db_name: &str,
        container_name: &str,
        document: Map<String, Value>,
        partition_key: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .send(
                Method::POST,
                &format!("dbs/{db_name}/colls/{container_name}/docs"),
                "docs",
                &format!("dbs/{db_name}/colls/{container_name}"),
                vec![
                    ("content-type", "application/json".to_string()),
                    ("x-ms-documentdb-is-upsert", "true".to_string()),
                    (
                        "x-ms-documentdb-partitionkey",
                        Self::partition_header(partition_key),
                    ),
                ],
                Some(Value::Object(document)),
            )
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure(response).await)
        }
    }

    async fn read_item(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<Option<Map<String, Value>>, ClientError> {
        let link = format!("dbs/{db_name}/colls/{container_name}/docs/{id}");
        let response = self
            .send(
                Method::GET,
                &link,
                "docs",
                &link,
                vec![(
                    "x-ms-documentdb-partitionkey",
                    Self::partition_header(partition_key),
                )],
                None,
            )
            .await?;

        match response.status().as_u16() {
            404 => Ok(None),
            status if (200..300).contains(&status) => {
                let document = response
                    .json::<Map<String, Value>>()
                    .await
                    .map_err(|e| ClientError::Transport(e.to_string()))?;
                Ok(Some(document))
            }
            _ => Err(Self::failure(response).await),
        }
    }

    async fn delete_item(
        &self,
        db_name: &str,
        container_name: &str,
        id: &str,
        partition_key: &str,
    ) -> Result<(), ClientError> {
        self.delete_one(db_name, container_name, id, partition_key)
            .await
    }

    async fn bulk(
        &self,
        db_name: &str,
        container_name: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<(), ClientError> {
        // The REST surface has no single bulk-delete call; fan the batch
        // out concurrently and report the first failure
        let deletes = operations.iter().map(|operation| match operation.kind {
            BulkOperationKind::Delete => self.delete_one(
                db_name,
                container_name,
                &operation.id,
                &operation.partition_key,
            ),
        });

        for result in futures::future::join_all(deletes).await {
            result?;
        }
        Ok(())
    }

    async fn query_items(
        &self,
        db_name: &str,
        container_name: &str,
        query: QuerySpec,
        partition_key: Option<&str>,
    ) -> Result<Vec<Map<String, Value>>, ClientError> {
        let parameters: Vec<Value> = query
            .parameters
            .iter()
            .map(|p| json!({ "name": p.name, "value": p.value }))
            .collect();

        let mut headers = vec![
            ("x-ms-documentdb-isquery", "true".to_string()),
            ("content-type", "application/query+json".to_string()),
        ];
        match partition_key {
            Some(key) => headers.push((
                "x-ms-documentdb-partitionkey",
                Self::partition_header(key),
            )),
            None => headers.push((
                "x-ms-documentdb-query-enablecrosspartition",
                "true".to_string(),
            )),
        }

        let response = self
            .send(
                Method::POST,
                &format!("dbs/{db_name}/colls/{container_name}/docs"),
                "docs",
                &format!("dbs/{db_name}/colls/{container_name}"),
                headers,
                Some(json!({ "query": query.query, "parameters": parameters })),
            )
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let body = response
            .json::<QueryResponse>()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(body.documents)
    }

    async fn dispose(&self) {
        // reqwest releases its connections when the client drops
    }
}

impl std::fmt::Debug for CosmosRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosRestClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CosmosRestClient {
        CosmosRestClient::new("https://localhost:8081/", &BASE64.encode(b"master-key")).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_credentials() {
        assert!(CosmosRestClient::new("", "key").is_err());
        assert!(CosmosRestClient::new("https://localhost:8081", "").is_err());
    }

    #[test]
    fn test_new_rejects_non_base64_key() {
        let err = CosmosRestClient::new("https://localhost:8081", "not base64!").unwrap_err();
        assert!(matches!(err, SessionStorageError::Configuration(_)));
    }

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        assert_eq!(client().endpoint, "https://localhost:8081");
    }

    #[test]
    fn test_auth_token_is_url_encoded_master_token() {
        let token = client()
            .auth_token("GET", "docs", "dbs/db/colls/c/docs/id", "mon, 01 jan 2024 00:00:00 gmt")
            .unwrap();

        assert!(token.starts_with("type%3Dmaster%26ver%3D1.0%26sig%3D"));
        // The signature is base64; '+' and '/' must arrive percent-encoded
        assert!(!token.contains('+'));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_auth_token_is_deterministic() {
        let a = client()
            .auth_token("get", "dbs", "", "mon, 01 jan 2024 00:00:00 gmt")
            .unwrap();
        let b = client()
            .auth_token("GET", "dbs", "", "Mon, 01 Jan 2024 00:00:00 GMT")
            .unwrap();
        // Verb and date are lowercased before signing
        assert_eq!(a, b);
    }

    #[test]
    fn test_partition_header_is_json_array() {
        assert_eq!(CosmosRestClient::partition_header("pk"), r#"["pk"]"#);
    }
}
