use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use pitstop_bookings::{BookingStatus, PaymentMethod, PaymentStatus};
use pitstop_infra::command_dispatcher::DispatchError;
use pitstop_infra::reconcile::ReconcileError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::InsufficientStock {
            requested,
            available,
        } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "insufficient_stock",
                "message": format!("requested {requested} but only {available} on hand"),
                "requested": requested,
                "available": available,
            })),
        )
            .into_response(),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        // Persistence details stay in the logs; clients get a generic 500.
        DispatchError::Deserialize(msg) => {
            tracing::error!(detail = %msg, "stored event failed to deserialize");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
        DispatchError::Store(e) => {
            tracing::error!(detail = ?e, "event store operation failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::BusinessIsolation(msg) => {
            json_error(StatusCode::FORBIDDEN, "business_isolation", msg)
        }
    }
}

pub fn reconcile_error_to_response(err: ReconcileError) -> axum::response::Response {
    match err {
        ReconcileError::Stock(e) | ReconcileError::Booking(e) => dispatch_error_to_response(e),
        // Compensation failures leave the ledger and booking out of step;
        // surface loudly rather than mapping to the original cause.
        ReconcileError::CompensationFailed { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "compensation_failed",
            err.to_string(),
        ),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Request validation failure tied to a specific field. The body carries
/// a field -> message map so clients can attach errors to inputs.
pub fn field_error(
    code: &'static str,
    field: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": code,
            "errors": { field: message.into() },
        })),
    )
        .into_response()
}

pub fn parse_booking_status(s: &str) -> Result<BookingStatus, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(BookingStatus::Pending),
        "ongoing" => Ok(BookingStatus::Ongoing),
        "completed" => Ok(BookingStatus::Completed),
        "cancelled" => Ok(BookingStatus::Cancelled),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: pending, ongoing, completed, cancelled",
        )),
    }
}

pub fn parse_payment_status(s: &str) -> Result<PaymentStatus, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "pending" => Ok(PaymentStatus::Pending),
        "paid" => Ok(PaymentStatus::Paid),
        "unpaid" => Ok(PaymentStatus::Unpaid),
        "charge" => Ok(PaymentStatus::Charge),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_payment_status",
            "payment_status must be one of: pending, paid, unpaid, charge",
        )),
    }
}

pub fn parse_payment_method(s: &str) -> Result<PaymentMethod, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "cash" => Ok(PaymentMethod::Cash),
        "debit" => Ok(PaymentMethod::Debit),
        "credit" => Ok(PaymentMethod::Credit),
        "interac" => Ok(PaymentMethod::Interac),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_payment_method",
            "payment_method must be one of: cash, debit, credit, interac",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitstop_infra::event_store::EventStoreError;

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn store_failures_hide_internal_detail() {
        let resp = dispatch_error_to_response(DispatchError::Store(
            EventStoreError::InvalidAppend("events table is missing".to_string()),
        ));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "internal error");
    }

    #[tokio::test]
    async fn deserialize_failures_hide_internal_detail() {
        let resp = dispatch_error_to_response(DispatchError::Deserialize(
            "missing field `payload` at line 1".to_string(),
        ));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "internal error");
    }
}
