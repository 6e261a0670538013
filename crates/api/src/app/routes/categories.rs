use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;

use pitstop_core::AggregateId;
use pitstop_infra::projections::categories::CATEGORY_AGGREGATE_TYPE;
use pitstop_inventory::{Category, CategoryCommand, CategoryId, CreateCategory, RenameCategory};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_category).get(list_categories))
        .route("/:id", get(get_category))
        .route("/:id/name", put(rename_category))
}

pub async fn create_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Json(body): Json<dto::CreateCategoryRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let category_id = CategoryId::new(agg);

    let cmd = CategoryCommand::CreateCategory(CreateCategory {
        business_id: business.business_id(),
        category_id,
        name: body.name,
        description: body.description,
        field_names: body.field_names,
        compatible_vehicles: body.compatible_vehicles,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Category>(
        business.business_id(),
        agg,
        CATEGORY_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Category::empty(CategoryId::new(aggregate_id)),
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

pub async fn rename_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RenameCategoryRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "category id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let category_id = CategoryId::new(agg);

    let cmd = CategoryCommand::RenameCategory(RenameCategory {
        business_id: business.business_id(),
        category_id,
        name: body.name,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Category>(
        business.business_id(),
        agg,
        CATEGORY_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| Category::empty(CategoryId::new(aggregate_id)),
    ) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
) -> axum::response::Response {
    let records = services.categories_list(business.business_id());
    let categories = records.iter().map(dto::category_to_json).collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "categories": categories })),
    )
        .into_response()
}

pub async fn get_category(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "category id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let category_id = CategoryId::new(agg);
    match services.category_get(business.business_id(), &category_id) {
        Some(record) => (StatusCode::OK, Json(dto::category_to_json(&record))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "category not found"),
    }
}
