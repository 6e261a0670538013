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
use pitstop_infra::projections::parties::CUSTOMER_AGGREGATE_TYPE;
use pitstop_parties::{AddVehicle, Customer, CustomerCommand, CustomerId, RegisterCustomer};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_customer).get(list_customers))
        .route("/:id", get(get_customer))
        .route("/:id/vehicles", post(add_vehicle))
}

pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Json(body): Json<dto::RegisterCustomerRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let customer_id = CustomerId::new(agg);

    let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
        business_id: business.business_id(),
        customer_id,
        name: body.name,
        email: body.email,
        phone: body.phone,
        vehicles: body
            .vehicles
            .into_iter()
            .map(dto::VehicleDto::into_vehicle)
            .collect(),
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Customer>(
        business.business_id(),
        agg,
        CUSTOMER_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Customer::empty(CustomerId::new(aggregate_id)),
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

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
) -> axum::response::Response {
    let records = services.customers_list(business.business_id());
    let customers = records.iter().map(dto::customer_to_json).collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "customers": customers })),
    )
        .into_response()
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let customer_id = CustomerId::new(agg);
    match services.customer_get(business.business_id(), &customer_id) {
        Some(record) => (StatusCode::OK, Json(dto::customer_to_json(&record))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "customer not found"),
    }
}

pub async fn add_vehicle(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::VehicleDto>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "customer id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let customer_id = CustomerId::new(agg);

    let vehicle = body.into_vehicle();
    let vehicle_id = vehicle.vehicle_id;

    let cmd = CustomerCommand::AddVehicle(AddVehicle {
        business_id: business.business_id(),
        customer_id,
        vehicle,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Customer>(
        business.business_id(),
        agg,
        CUSTOMER_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Customer::empty(CustomerId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "vehicle_id": vehicle_id.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}
