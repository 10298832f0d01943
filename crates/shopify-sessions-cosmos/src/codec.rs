// Session codec
//
// Maps between the domain Session and the document stored in the
// container. Encoding injects the configured partition-key attribute for
// non-default paths; decoding strips Cosmos system metadata and revives
// the expiry timestamp.

use serde_json::{Map, Value};
use shopify_sessions_core::{Result, Session, SessionStorageError};

use crate::partition::PartitionKeyResolver;

/// Cosmos-managed fields present on read paths but never part of the session
const SYSTEM_FIELDS: [&str; 5] = ["_rid", "_self", "_etag", "_attachments", "_ts"];

/// A session as it is written to the container
///
/// One shape regardless of configuration: `partition_key` is the value
/// injected into the document under the configured partition-key
/// attribute, and stays `None` under the default `/id` path where the
/// document already carries its own key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    /// The document body, session attributes plus any injected key
    pub document: Map<String, Value>,

    /// Injected partition key value, if the path is non-default
    pub partition_key: Option<String>,
}

/// Encode a session into its stored document
pub fn encode_session(session: &Session, resolver: &PartitionKeyResolver) -> Result<StoredItem> {
    let value = serde_json::to_value(session)
        .map_err(|e| SessionStorageError::serialization(e.to_string()))?;
    let Value::Object(mut document) = value else {
        return Err(SessionStorageError::serialization(
            "session did not serialize to an object",
        ));
    };

    let mut partition_key = None;
    if !resolver.is_default_path() {
        let key = resolver.resolve_by_id(&session.id)?;
        document.insert(
            resolver.attribute_name().to_string(),
            Value::String(key.clone()),
        );
        partition_key = Some(key);
    }

    Ok(StoredItem {
        document,
        partition_key,
    })
}

/// Decode a stored document back into a session
///
/// The expiry attribute, when present, is parsed back into a timestamp;
/// an absent expiry stays absent. Attributes the adapter does not
/// interpret land in the session's extension map.
pub fn decode_item(mut document: Map<String, Value>) -> Result<Session> {
    for field in SYSTEM_FIELDS {
        document.remove(field);
    }

    serde_json::from_value(Value::Object(document))
        .map_err(|e| SessionStorageError::serialization(e.to_string()))
}
