//! Projections: disposable read models fed by published envelopes.
//!
//! Projections are idempotent under at-least-once delivery. Each keeps a
//! per-stream sequence cursor and ignores replays at or below it, so a
//! re-published envelope never double-applies.

pub mod bookings;
pub mod catalog;
pub mod categories;
pub mod parties;
pub mod stock_levels;

pub use bookings::{BookingSummary, BookingsProjection};
pub use catalog::{ServiceCatalogProjection, ServiceRecord};
pub use categories::{CategoriesProjection, CategoryRecord};
pub use parties::{
    CustomerDirectoryProjection, CustomerRecord, SupplierDirectoryProjection, SupplierRecord,
};
pub use stock_levels::{StockLevel, StockLevelsProjection};
