use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use pitstop_catalog::{
    CreateService, Service, ServiceCommand, ServiceField, ServiceId, SetServicePrice,
};
use pitstop_core::AggregateId;
use pitstop_infra::projections::catalog::SERVICE_AGGREGATE_TYPE;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_service).get(list_services))
        .route("/:id", get(get_service))
        .route("/:id/price", put(set_price))
}

pub async fn create_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Json(body): Json<dto::CreateServiceRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let service_id = ServiceId::new(agg);

    let price = match dto::parse_money(&body.price, "price") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ServiceCommand::CreateService(CreateService {
        business_id: business.business_id(),
        service_id,
        name: body.name,
        price,
        fields: body
            .fields
            .into_iter()
            .map(|f| ServiceField {
                name: f.name,
                value: f.value,
            })
            .collect(),
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Service>(
        business.business_id(),
        agg,
        SERVICE_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Service::empty(ServiceId::new(aggregate_id)),
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

pub async fn list_services(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
) -> axum::response::Response {
    let records = services.services_list(business.business_id());
    let listed = records.iter().map(dto::service_to_json).collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "services": listed })),
    )
        .into_response()
}

pub async fn get_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "service id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let service_id = ServiceId::new(agg);
    match services.service_get(business.business_id(), &service_id) {
        Some(record) => (StatusCode::OK, Json(dto::service_to_json(&record))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "service not found"),
    }
}

pub async fn set_price(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetServicePriceRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "service id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let service_id = ServiceId::new(agg);

    let price = match dto::parse_money(&body.price, "price") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = ServiceCommand::SetServicePrice(SetServicePrice {
        business_id: business.business_id(),
        service_id,
        price,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Service>(
        business.business_id(),
        agg,
        SERVICE_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Service::empty(ServiceId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}
