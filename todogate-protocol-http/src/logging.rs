use std::fmt::Display;
use std::sync::Arc;

use http::{Method, StatusCode, Uri};
use poem::web::Data;
use poem::{Endpoint, FromRequest, IntoResponse, Request, Response};
use todogate_core::Services;
use tracing::*;

pub async fn get_client_ip(req: &Request, services: Option<&Services>) -> Option<String> {
    let trust_x_forwarded_headers = if let Some(services) = services {
        let config = services.config.lock().await;
        config.store.http.trust_x_forwarded_headers
    } else {
        false
    };

    let remote_ip = req.remote_addr().as_socket_addr().map(|x| x.ip().to_string());

    if trust_x_forwarded_headers {
        req.header("x-forwarded-for")
            .map(|x| x.to_string())
            .or(remote_ip)
    } else {
        remote_ip
    }
}

pub fn log_request_result(
    method: &Method,
    url: &Uri,
    client_ip: Option<&str>,
    status: &StatusCode,
) {
    let client_ip = client_ip.unwrap_or("<unknown>");
    if *status == StatusCode::TOO_MANY_REQUESTS {
        debug!(%method, %url, %status, %client_ip, "Request throttled");
    } else if status.is_server_error() || status.is_client_error() {
        warn!(%method, %url, %status, %client_ip, "Request failed");
    } else {
        info!(%method, %url, %status, %client_ip, "Request");
    }
}

pub fn log_request_error<E: Display>(
    method: &Method,
    url: &Uri,
    client_ip: Option<&str>,
    error: &E,
) {
    let client_ip = client_ip.unwrap_or("<unknown>");
    error!(%method, %url, %error, %client_ip, "Request failed");
}

pub(crate) async fn log_request<E: Endpoint + 'static>(
    ep: Arc<E>,
    req: Request,
) -> poem::Result<Response> {
    let client_ip = {
        let services = Data::<&Services>::from_request_without_body(&req).await.ok();
        get_client_ip(&req, services.as_deref().copied()).await
    };
    let method = req.method().clone();
    let url = req.original_uri().clone();
    let span = info_span!("HTTP", client_ip = client_ip.as_deref().unwrap_or("<unknown>"));

    async move {
        let response = match ep.call(req).await {
            Ok(response) => response.into_response(),
            Err(error) => {
                if error.status().is_server_error() {
                    log_request_error(&method, &url, client_ip.as_deref(), &error);
                }
                error.into_response()
            }
        };

        log_request_result(&method, &url, client_ip.as_deref(), &response.status());
        Ok(response)
    }
    .instrument(span)
    .await
}
