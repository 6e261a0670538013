//! Append-only event store boundary.
//!
//! Storage-agnostic abstraction over business-scoped event streams. The
//! in-memory implementation backs tests and development; the Postgres
//! implementation (behind the `postgres` feature) backs production.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
