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
use pitstop_inventory::{
    AttributeField, CategoryId, ConsumeStock, CreateItem, ReceiveStock, RestockReturn, StockItem,
    StockItemCommand, StockItemId,
};
use pitstop_parties::SupplierId;

use pitstop_infra::projections::stock_levels::STOCK_ITEM_AGGREGATE_TYPE;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/items", post(create_item).get(list_items))
        .route("/items/:id", get(get_item))
        .route("/items/:id/receive", post(receive_stock))
        .route("/items/:id/consume", post(consume_stock))
        .route("/items/:id/restock", post(restock_return))
        .route("/low-stock", get(list_low_stock))
}

pub async fn create_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Json(body): Json<dto::CreateItemRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let item_id = StockItemId::new(agg);

    let retail_price = match dto::parse_money(&body.retail_price, "retail_price") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let unit_cost = match body.unit_cost.as_deref() {
        Some(s) => match dto::parse_money(s, "unit_cost") {
            Ok(v) => Some(v),
            Err(resp) => return resp,
        },
        None => None,
    };
    let category_id = match body.category_id.as_deref() {
        Some(s) => match dto::parse_aggregate_id(s, "category id") {
            Ok(v) => Some(CategoryId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };

    let cmd = StockItemCommand::CreateItem(CreateItem {
        business_id: business.business_id(),
        item_id,
        name: body.name,
        brand: body.brand,
        sku: body.sku,
        category_id,
        unit_cost,
        retail_price,
        unit: body.unit,
        reorder_point: body.reorder_point,
        location: body.location,
        attributes: body
            .attributes
            .into_iter()
            .map(|f| AttributeField {
                name: f.name,
                value: f.value,
            })
            .collect(),
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<StockItem>(
        business.business_id(),
        agg,
        STOCK_ITEM_AGGREGATE_TYPE,
        &cmd,
        |_business_id, aggregate_id| StockItem::empty(StockItemId::new(aggregate_id)),
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

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
) -> axum::response::Response {
    let levels = services.stock_list(business.business_id());
    let items = levels
        .iter()
        .map(dto::stock_level_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let item_id = StockItemId::new(agg);
    match services.stock_get(business.business_id(), &item_id) {
        Some(level) => (StatusCode::OK, Json(dto::stock_level_to_json(&level))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "item not found"),
    }
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
) -> axum::response::Response {
    let levels = services.stock_low(business.business_id());
    let items = levels
        .iter()
        .map(dto::stock_level_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn receive_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveStockRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id = StockItemId::new(agg);

    let supplier_id = match body.supplier_id.as_deref() {
        Some(s) => match dto::parse_aggregate_id(s, "supplier id") {
            Ok(v) => Some(SupplierId::new(v)),
            Err(resp) => return resp,
        },
        None => None,
    };
    let cost = match body.cost.as_deref() {
        Some(s) => match dto::parse_money(s, "cost") {
            Ok(v) => Some(v),
            Err(resp) => return resp,
        },
        None => None,
    };

    let cmd = StockItemCommand::ReceiveStock(ReceiveStock {
        business_id: business.business_id(),
        item_id,
        quantity: body.quantity,
        supplier_id,
        cost,
        reference: body.reference,
        note: body.note,
        occurred_at: Utc::now(),
    });

    dispatch_stock_command(&services, business, agg, &cmd)
}

pub async fn consume_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ConsumeStockRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id = StockItemId::new(agg);

    let booking_ref = match body.booking_ref.as_deref() {
        Some(s) => match dto::parse_aggregate_id(s, "booking ref") {
            Ok(v) => Some(v),
            Err(resp) => return resp,
        },
        None => None,
    };

    let cmd = StockItemCommand::ConsumeStock(ConsumeStock {
        business_id: business.business_id(),
        item_id,
        quantity: body.quantity,
        booking_ref,
        occurred_at: Utc::now(),
    });

    dispatch_stock_command(&services, business, agg, &cmd)
}

pub async fn restock_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RestockReturnRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "item id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id = StockItemId::new(agg);

    let booking_ref = match dto::parse_aggregate_id(&body.booking_ref, "booking ref") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = StockItemCommand::RestockReturn(RestockReturn {
        business_id: business.business_id(),
        item_id,
        quantity: body.quantity,
        booking_ref,
        occurred_at: Utc::now(),
    });

    dispatch_stock_command(&services, business, agg, &cmd)
}

fn dispatch_stock_command(
    services: &AppServices,
    business: crate::context::BusinessContext,
    agg: AggregateId,
    cmd: &StockItemCommand,
) -> axum::response::Response {
    let committed = match services.dispatch::<StockItem>(
        business.business_id(),
        agg,
        STOCK_ITEM_AGGREGATE_TYPE,
        cmd,
        |_business_id, aggregate_id| StockItem::empty(StockItemId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed.len(),
            "stream_version": committed.last().map(|e| e.sequence_number).unwrap_or(0),
        })),
    )
        .into_response()
}
