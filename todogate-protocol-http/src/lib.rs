pub mod api;
mod common;
mod logging;
mod middleware;
#[cfg(test)]
mod tests;

use std::fmt::Debug;

use anyhow::{Context, Result};
pub use common::{RequestAuthorization, SessionAuthorization, SessionExt, SESSION_COOKIE_NAME};
use poem::listener::TcpListener;
use poem::session::{CookieConfig, MemoryStorage, ServerSession};
use poem::{Endpoint, EndpointExt, Route, Server};
use poem_openapi::OpenApiService;
use todogate_common::ListenEndpoint;
use todogate_core::Services;
use tracing::*;

use crate::common::inject_request_authorization;
use crate::logging::log_request;
use crate::middleware::RateLimitMiddleware;

#[derive(Clone)]
pub struct HTTPProtocolServer {
    services: Services,
}

impl HTTPProtocolServer {
    pub fn new(services: &Services) -> Self {
        HTTPProtocolServer {
            services: services.clone(),
        }
    }

    pub async fn run(self, address: ListenEndpoint) -> Result<()> {
        let app = make_app(&self.services).await;

        info!(?address, "Listening");
        Server::new(TcpListener::bind(address.address()))
            .run(app)
            .await
            .context("Failed to start HTTP server")
    }
}

impl Debug for HTTPProtocolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTPProtocolServer")
    }
}

pub async fn make_app(services: &Services) -> impl Endpoint {
    let session_max_age = services.config.lock().await.store.http.session_max_age;

    let api_service = OpenApiService::new(api::get(), "Todogate", env!("CARGO_PKG_VERSION"))
        .server("/api");
    let spec_endpoint = api_service.spec_endpoint();

    let cookie_config = CookieConfig::default()
        .name(SESSION_COOKIE_NAME)
        .http_only(true)
        // served over plain HTTP, TLS is terminated upstream if at all
        .secure(false)
        .max_age(session_max_age);

    Route::new()
        .nest("/api", api_service)
        .at("/openapi.json", spec_endpoint)
        .with(RateLimitMiddleware::new())
        .around(|ep, req| async move { inject_request_authorization(ep, req).await })
        .with(ServerSession::new(cookie_config, MemoryStorage::new()))
        .around(|ep, req| async move { log_request(ep, req).await })
        .data(services.clone())
}
