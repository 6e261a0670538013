use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;

use pitstop_bookings::BookingId;
use pitstop_core::TaxRate;
use pitstop_infra::command_dispatcher::DispatchError;
use pitstop_invoicing::{InvoiceDocument, Settlement, StaticPriceBook};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/bookings/:id", post(generate_invoice))
}

/// Price the booking against current catalog/inventory state and produce
/// a render-ready invoice. Regeneration is stable for a settled booking:
/// the invoice number derives from the booking id.
pub async fn generate_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::GenerateInvoiceRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);
    let business_id = business.business_id();

    let tax_rate = match TaxRate::from_basis_points(body.tax_rate_bps) {
        Ok(v) => v,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_tax_rate", e.to_string());
        }
    };

    let booking = match services.load_booking(business_id, booking_id) {
        Ok(b) => b,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    // Assemble a price book covering exactly the booking's lines.
    let mut price_book = StaticPriceBook::new();
    for line in booking.service_lines() {
        if let Some(record) = services.service_get(business_id, &line.service_id) {
            price_book =
                price_book.with_service(business_id, record.service_id, record.name, record.price);
        }
    }
    for line in booking.parts_lines() {
        if let Some(level) = services.stock_get(business_id, &line.item_id) {
            price_book =
                price_book.with_part(business_id, level.item_id, level.name, level.retail_price);
        }
    }

    let settlement = match Settlement::compute(&booking, &price_book, tax_rate) {
        Ok(s) => s,
        Err(e) => return errors::dispatch_error_to_response(DispatchError::from(e)),
    };

    let customer = match booking
        .customer_id()
        .and_then(|customer_id| services.customer_get(business_id, &customer_id))
    {
        Some(c) => c,
        None => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                "customer not found for booking",
            );
        }
    };

    let vehicle = booking.vehicle_id().and_then(|vehicle_id| {
        customer
            .vehicles
            .iter()
            .find(|v| v.vehicle_id == vehicle_id)
            .map(|v| format!("{} {} {}", v.make, v.model, v.year).trim().to_string())
    });

    let customer_phone = if customer.phone.is_empty() {
        None
    } else {
        Some(customer.phone.clone())
    };

    let document = match InvoiceDocument::build(
        &booking,
        &settlement,
        body.business_name,
        customer.name,
        customer_phone,
        vehicle,
        Utc::now(),
    ) {
        Ok(d) => d,
        Err(e) => return errors::dispatch_error_to_response(DispatchError::from(e)),
    };

    let text = document.render_text();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "invoice": document,
            "text": text,
        })),
    )
        .into_response()
}
