use poem_openapi::Object;
use todogate_common::Secret;

#[derive(Object)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
}
