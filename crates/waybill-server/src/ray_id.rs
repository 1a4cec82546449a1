//! Request correlation id (ray id).
//!
//! The `x-ray-id` header is stamped onto every request at the edge of the
//! router and propagated to the response; handlers read it through the
//! [`RayId`] extractor so error bodies can carry it.

use axum::extract::FromRequestParts;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};

/// Header carrying the correlation id.
pub const RAY_ID_HEADER: HeaderName = HeaderName::from_static("x-ray-id");

/// Generates a UUID ray id for requests that arrive without one.
#[derive(Clone, Copy, Default)]
pub struct MakeRayId;

impl MakeRequestId for MakeRayId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Extractor yielding the request's ray id.
#[derive(Debug, Clone)]
pub struct RayId(pub String);

impl<S> FromRequestParts<S> for RayId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(&RAY_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        Ok(RayId(id))
    }
}
