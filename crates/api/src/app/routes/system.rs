use axum::{Json, http::StatusCode, response::IntoResponse};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    axum::extract::Extension(business): axum::extract::Extension<crate::context::BusinessContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "business_id": business.business_id().to_string(),
    }))
}
