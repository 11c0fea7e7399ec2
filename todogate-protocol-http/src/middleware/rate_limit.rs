use std::time::Duration;

use http::{header, StatusCode};
use poem::web::Data;
use poem::{Endpoint, FromRequest, IntoResponse, Middleware, Request, Response};
use serde::Serialize;
use todogate_core::rate_limiting::{PartitionKey, RequestIdentity};
use todogate_core::Services;
use tracing::*;

use crate::common::RequestAuthorization;

/// Admission gate in front of every handler. Each request takes one token from
/// the caller's read or write bucket, waiting in its queue if configured.
pub struct RateLimitMiddleware {}

impl RateLimitMiddleware {
    pub fn new() -> Self {
        RateLimitMiddleware {}
    }
}

pub struct RateLimitMiddlewareEndpoint<E: Endpoint> {
    inner: E,
}

impl<E: Endpoint> Middleware<E> for RateLimitMiddleware {
    type Output = RateLimitMiddlewareEndpoint<E>;

    fn transform(&self, inner: E) -> Self::Output {
        RateLimitMiddlewareEndpoint { inner }
    }
}

impl<E: Endpoint> Endpoint for RateLimitMiddlewareEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> poem::Result<Self::Output> {
        let (key, limiter) = {
            let services = Data::<&Services>::from_request_without_body(&req).await?;
            let auth =
                Option::<Data<&RequestAuthorization>>::from_request_without_body(&req).await?;

            let identity =
                RequestIdentity::resolve(auth.as_ref().map(|auth| auth.username().as_str()));
            let key = PartitionKey::build(req.method(), &identity);
            let limiter = services.rate_limiter_registry.get_or_create(&key);
            (key, limiter)
        };

        let lease = limiter.acquire(1).await;
        if !lease.is_acquired() {
            debug!(%key, retry_after = ?lease.retry_after, "Rate limit exceeded");
            return Ok(too_many_requests(lease.retry_after));
        }

        Ok(self.inner.call(req).await?.into_response())
    }
}

#[derive(Serialize)]
struct ProblemDetails {
    title: &'static str,
    detail: &'static str,
    status: u16,
}

/// Whole seconds to advertise in `Retry-After`, never less than one
pub fn retry_after_secs(retry_after: Option<Duration>) -> u64 {
    match retry_after {
        Some(hint) => {
            let secs = hint.as_secs() + u64::from(hint.subsec_nanos() > 0);
            secs.max(1)
        }
        None => 1,
    }
}

pub fn too_many_requests(retry_after: Option<Duration>) -> Response {
    let body = ProblemDetails {
        title: "Too Many Requests",
        detail: "Too many requests.",
        status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
    };
    let body = serde_json::to_string(&body).unwrap_or_default();

    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header(header::RETRY_AFTER, retry_after_secs(retry_after))
        .content_type("application/problem+json")
        .body(body)
}
