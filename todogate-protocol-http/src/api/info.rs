use poem::web::Data;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};

use crate::common::RequestAuthorization;

pub struct Api;

#[derive(Object)]
pub struct Info {
    version: String,
    username: Option<String>,
}

#[derive(ApiResponse)]
enum InstanceInfoResponse {
    #[oai(status = 200)]
    Ok(Json<Info>),
}

#[OpenApi]
impl Api {
    #[oai(path = "/info", method = "get", operation_id = "get_info")]
    async fn api_get_info(
        &self,
        auth: Option<Data<&RequestAuthorization>>,
    ) -> poem::Result<InstanceInfoResponse> {
        Ok(InstanceInfoResponse::Ok(Json(Info {
            version: env!("CARGO_PKG_VERSION").to_string(),
            username: auth.map(|auth| auth.username().clone()),
        })))
    }
}
