//! Disposable, rebuildable read models.

pub mod business_store;

pub use business_store::{BusinessStore, InMemoryBusinessStore};
