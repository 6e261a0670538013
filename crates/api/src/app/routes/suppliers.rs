use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use pitstop_core::AggregateId;
use pitstop_infra::projections::parties::SUPPLIER_AGGREGATE_TYPE;
use pitstop_parties::{RegisterSupplier, Supplier, SupplierCommand, SupplierId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_supplier).get(list_suppliers))
        .route("/:id", get(get_supplier))
}

pub async fn register_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Json(body): Json<dto::RegisterSupplierRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let supplier_id = SupplierId::new(agg);

    let cmd = SupplierCommand::RegisterSupplier(RegisterSupplier {
        business_id: business.business_id(),
        supplier_id,
        name: body.name,
        contact: body.contact.unwrap_or_default(),
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Supplier>(
        business.business_id(),
        agg,
        SUPPLIER_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Supplier::empty(SupplierId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
) -> axum::response::Response {
    let records = services.suppliers_list(business.business_id());
    let suppliers = records.iter().map(dto::supplier_to_json).collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "suppliers": suppliers })),
    )
        .into_response()
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "supplier id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let supplier_id = SupplierId::new(agg);
    match services.supplier_get(business.business_id(), &supplier_id) {
        Some(record) => (StatusCode::OK, Json(dto::supplier_to_json(&record))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "supplier not found"),
    }
}
