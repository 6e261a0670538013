use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use pitstop_core::BusinessId;

use crate::context::BusinessContext;

/// Header carrying the acting business (shop) identity.
pub const BUSINESS_ID_HEADER: &str = "x-business-id";

/// Resolve the business context for every domain route.
///
/// Requests without a parseable business id are rejected before any
/// handler runs; isolation downstream relies on this context being set.
pub async fn business_context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let business_id = extract_business_id(req.headers())?;

    req.extensions_mut()
        .insert(BusinessContext::new(business_id));

    Ok(next.run(req).await)
}

fn extract_business_id(headers: &HeaderMap) -> Result<BusinessId, StatusCode> {
    let header = headers
        .get(BUSINESS_ID_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let uuid = header
        .trim()
        .parse::<uuid::Uuid>()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(BusinessId::from_uuid(uuid))
}
