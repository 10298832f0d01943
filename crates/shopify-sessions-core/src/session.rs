// Session domain type
//
// An OAuth session for a Shopify shop. The adapter treats the record as
// opaque apart from the identifier and shop attributes; everything a
// caller puts on a session must come back unchanged from storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An authorization session identified by a unique id and associated
/// with a shop, optionally time-limited.
///
/// Wire names are camelCase (`isOnline`, `accessToken`, ...) so documents
/// written by the JavaScript packages stay readable by this crate and
/// vice versa. Attributes the typed fields do not cover are captured in
/// [`Session::extra`] and round-trip through storage untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier
    pub id: String,

    /// Shop domain this session belongs to
    pub shop: String,

    /// OAuth state token
    pub state: String,

    /// Whether this is an online (per-user) session
    pub is_online: bool,

    /// Granted scopes; a comma-joined list that may exceed 255 characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Expiry timestamp; `None` means the session never expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    /// OAuth access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Online-access metadata returned by the OAuth flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online_access_info: Option<Value>,

    /// Caller-defined attributes preserved opaquely through storage
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Session {
    /// Create a session with the required attributes
    pub fn new(
        id: impl Into<String>,
        shop: impl Into<String>,
        state: impl Into<String>,
        is_online: bool,
    ) -> Self {
        Self {
            id: id.into(),
            shop: shop.into(),
            state: state.into(),
            is_online,
            scope: None,
            expires: None,
            access_token: None,
            online_access_info: None,
            extra: Map::new(),
        }
    }

    /// Set the granted scopes
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the expiry timestamp
    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set the access token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the online-access metadata
    pub fn with_online_access_info(mut self, info: Value) -> Self {
        self.online_access_info = Some(info);
        self
    }

    /// Attach a caller-defined attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether the session has an expiry in the past
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_wire_names_are_camel_case() {
        let session = Session::new("sid", "shop.myshopify.com", "state", true)
            .with_access_token("token-123");

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["isOnline"], json!(true));
        assert_eq!(value["accessToken"], json!("token-123"));
        assert!(value.get("is_online").is_none());
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let session = Session::new("sid", "shop", "state", false);
        let value = serde_json::to_value(&session).unwrap();

        assert!(value.get("expires").is_none());
        assert!(value.get("scope").is_none());
        assert!(value.get("accessToken").is_none());
    }

    #[test]
    fn test_extra_attributes_round_trip() {
        let session = Session::new("sid", "shop", "state", false)
            .with_attribute("customField", json!({"nested": [1, 2, 3]}));

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["customField"]["nested"], json!([1, 2, 3]));

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_expires_revives_from_string() {
        let expires = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap();
        let session = Session::new("sid", "shop", "state", false).with_expires(expires);

        let text = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&text).unwrap();
        assert_eq!(back.expires, Some(expires));
    }

    #[test]
    fn test_is_expired() {
        let past = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let session = Session::new("sid", "shop", "state", false).with_expires(past);
        assert!(session.is_expired());

        let eternal = Session::new("sid", "shop", "state", false);
        assert!(!eternal.is_expired());
    }
}
