use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;

use pitstop_bookings::{
    AssignTechnicians, Booking, BookingCommand, BookingId, BookingStatus, ChangePaymentStatus,
    ChangeStatus, PartsLine, Reschedule, ScheduleBooking, ServiceLine, SetNote, SetPaymentMethod,
};
use pitstop_catalog::ServiceId;
use pitstop_core::{AggregateId, UserId};
use pitstop_infra::projections::bookings::BOOKING_AGGREGATE_TYPE;
use pitstop_inventory::StockItemId;
use pitstop_parties::{CustomerId, VehicleId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(schedule_booking).get(list_bookings))
        .route("/:id", get(get_booking))
        .route("/:id/reschedule", post(reschedule))
        .route("/:id/status", post(change_status))
        .route("/:id/payment-status", post(change_payment_status))
        .route("/:id/payment-method", post(set_payment_method))
        .route("/:id/technicians", post(assign_technicians))
        .route("/:id/note", post(set_note))
        .route("/:id/parts", put(replace_parts))
}

pub async fn schedule_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Json(body): Json<dto::ScheduleBookingRequest>,
) -> axum::response::Response {
    let agg = AggregateId::new();
    let booking_id = BookingId::new(agg);

    let customer_id = match dto::parse_aggregate_id(&body.customer_id, "customer id") {
        Ok(v) => CustomerId::new(v),
        Err(resp) => return resp,
    };

    let mut service_lines = Vec::with_capacity(body.service_lines.len());
    for line in body.service_lines {
        let service_id = match dto::parse_aggregate_id(&line.service_id, "service id") {
            Ok(v) => ServiceId::new(v),
            Err(resp) => return resp,
        };
        service_lines.push(ServiceLine {
            service_id,
            quantity: line.quantity,
        });
    }

    let cmd = BookingCommand::ScheduleBooking(ScheduleBooking {
        business_id: business.business_id(),
        booking_id,
        scheduled_at: body.scheduled_at,
        customer_id,
        vehicle_id: body.vehicle_id.map(VehicleId),
        service_lines,
        occurred_at: Utc::now(),
    });

    let committed = match dispatch_booking(&services, business, agg, &cmd) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "events_committed": committed,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    pub status: Option<String>,
}

pub async fn list_bookings(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Query(query): Query<ListBookingsQuery>,
) -> axum::response::Response {
    let summaries = match query.status.as_deref() {
        Some(s) => {
            let status = match errors::parse_booking_status(s) {
                Ok(v) => v,
                Err(resp) => return resp,
            };
            services.bookings_list_by_status(business.business_id(), status)
        }
        None => services.bookings_list(business.business_id()),
    };

    let bookings = summaries.iter().map(dto::booking_to_json).collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "bookings": bookings })),
    )
        .into_response()
}

pub async fn get_booking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let booking_id = BookingId::new(agg);
    match services.booking_get(business.business_id(), &booking_id) {
        Some(summary) => (StatusCode::OK, Json(dto::booking_to_json(&summary))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "booking not found"),
    }
}

pub async fn reschedule(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RescheduleRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let cmd = BookingCommand::Reschedule(Reschedule {
        business_id: business.business_id(),
        booking_id,
        scheduled_at: body.scheduled_at,
        occurred_at: Utc::now(),
    });

    ok_response(&services, business, agg, &cmd)
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeStatusRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let status = match errors::parse_booking_status(&body.status) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Cancellation returns consumed parts to the shelf on top of the
    // status change, so it runs through the reconciliation workflow.
    if status == BookingStatus::Cancelled {
        return match services.cancel_booking(business.business_id(), booking_id, Utc::now()) {
            Ok(()) => (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id": agg.to_string(),
                    "status": status,
                })),
            )
                .into_response(),
            Err(e) => errors::reconcile_error_to_response(e),
        };
    }

    let cmd = BookingCommand::ChangeStatus(ChangeStatus {
        business_id: business.business_id(),
        booking_id,
        status,
        occurred_at: Utc::now(),
    });

    ok_response(&services, business, agg, &cmd)
}

pub async fn change_payment_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangePaymentStatusRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let payment_status = match errors::parse_payment_status(&body.payment_status) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = BookingCommand::ChangePaymentStatus(ChangePaymentStatus {
        business_id: business.business_id(),
        booking_id,
        payment_status,
        occurred_at: Utc::now(),
    });

    ok_response(&services, business, agg, &cmd)
}

pub async fn set_payment_method(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetPaymentMethodRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let payment_method = match errors::parse_payment_method(&body.payment_method) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = BookingCommand::SetPaymentMethod(SetPaymentMethod {
        business_id: business.business_id(),
        booking_id,
        payment_method,
        occurred_at: Utc::now(),
    });

    ok_response(&services, business, agg, &cmd)
}

pub async fn assign_technicians(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignTechniciansRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let cmd = BookingCommand::AssignTechnicians(AssignTechnicians {
        business_id: business.business_id(),
        booking_id,
        technician_ids: body
            .technician_ids
            .into_iter()
            .map(UserId::from_uuid)
            .collect(),
        occurred_at: Utc::now(),
    });

    ok_response(&services, business, agg, &cmd)
}

pub async fn set_note(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetNoteRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let cmd = BookingCommand::SetNote(SetNote {
        business_id: business.business_id(),
        booking_id,
        note: body.note,
        occurred_at: Utc::now(),
    });

    ok_response(&services, business, agg, &cmd)
}

pub async fn replace_parts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(business): Extension<crate::context::BusinessContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReplacePartsRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_aggregate_id(&id, "booking id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let booking_id = BookingId::new(agg);

    let mut lines = Vec::with_capacity(body.lines.len());
    for line in body.lines {
        let item_id = match dto::parse_aggregate_id(&line.item_id, "item id") {
            Ok(v) => StockItemId::new(v),
            Err(resp) => return resp,
        };
        lines.push(PartsLine {
            item_id,
            quantity: line.quantity,
            included_with_service: line.included_with_service,
        });
    }

    match services.replace_booking_parts(business.business_id(), booking_id, lines, Utc::now()) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string() })),
        )
            .into_response(),
        Err(e) => errors::reconcile_error_to_response(e),
    }
}

fn dispatch_booking(
    services: &AppServices,
    business: crate::context::BusinessContext,
    agg: AggregateId,
    cmd: &BookingCommand,
) -> Result<usize, axum::response::Response> {
    services
        .dispatch::<Booking>(
            business.business_id(),
            agg,
            BOOKING_AGGREGATE_TYPE,
            cmd,
            |_business_id, aggregate_id| Booking::empty(BookingId::new(aggregate_id)),
        )
        .map(|committed| committed.len())
        .map_err(errors::dispatch_error_to_response)
}

fn ok_response(
    services: &AppServices,
    business: crate::context::BusinessContext,
    agg: AggregateId,
    cmd: &BookingCommand,
) -> axum::response::Response {
    match dispatch_booking(services, business, agg, cmd) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "events_committed": committed,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
