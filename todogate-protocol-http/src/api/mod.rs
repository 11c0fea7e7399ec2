use poem_openapi::OpenApi;

pub mod auth;
mod common;
pub mod info;
pub mod todos;
pub mod users;

pub fn get() -> impl OpenApi {
    (auth::Api, info::Api, todos::Api, users::Api)
}
