// Storage trait implemented by session persistence backends
//
// Backends can be:
// - A remote document database (the cosmos crate)
// - In-memory implementations for examples and testing

use async_trait::async_trait;

use crate::error::Result;
use crate::session::Session;

/// Trait for storing and retrieving OAuth sessions
///
/// Storing is an upsert: a second store with the same id replaces the
/// first. "Not found" is a successful `None`/no-op result for loads and
/// deletes, never an error.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Store a session, replacing any existing session with the same id
    async fn store_session(&self, session: Session) -> Result<()>;

    /// Load the session with the given id, if one exists
    async fn load_session(&self, id: &str) -> Result<Option<Session>>;

    /// Delete the session with the given id; deleting a missing id succeeds
    async fn delete_session(&self, id: &str) -> Result<()>;

    /// Delete a batch of sessions by id
    async fn delete_sessions(&self, ids: &[String]) -> Result<()>;

    /// Find every session belonging to the given shop
    async fn find_sessions_by_shop(&self, shop: &str) -> Result<Vec<Session>>;
}
