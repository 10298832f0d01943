// Session Storage Contract
//
// This crate defines the pieces every session storage backend shares:
// - The Session domain type (an OAuth session for a Shopify shop)
// - The SessionStorage trait backends implement
// - The error taxonomy and Result alias surfaced to hosts
//
// Key design decisions:
// - Sessions carry an open extension map so caller-defined attributes
//   survive a store/load cycle without the backend interpreting them
// - Wire names are camelCase to stay compatible with documents written
//   by the JavaScript ecosystem packages
// - Errors are Clone so a backend can hand one shared failure to every
//   caller waiting on its readiness signal

pub mod error;
pub mod session;
pub mod traits;

pub use error::{Result, SessionStorageError};
pub use session::Session;
pub use traits::SessionStorage;
