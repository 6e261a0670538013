use axum::{Router, routing::get};

pub mod bookings;
pub mod categories;
pub mod customers;
pub mod inventory;
pub mod invoices;
pub mod services_catalog;
pub mod suppliers;
pub mod system;

/// Router for all business-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/inventory", inventory::router())
        .nest("/categories", categories::router())
        .nest("/services", services_catalog::router())
        .nest("/customers", customers::router())
        .nest("/suppliers", suppliers::router())
        .nest("/bookings", bookings::router())
        .nest("/invoices", invoices::router())
}
