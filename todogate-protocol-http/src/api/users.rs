use chrono::{DateTime, Utc};
use poem::web::Data;
use poem_openapi::payload::{Json, PlainText};
use poem_openapi::{ApiResponse, Object, OpenApi};
use todogate_common::TodoError;
use todogate_core::{Services, UserProvider};
use todogate_db_entities::User;

use super::common::Credentials;

const MIN_PASSWORD_LENGTH: usize = 8;

pub struct Api;

#[derive(Object)]
struct UserInfo {
    username: String,
    created: DateTime<Utc>,
}

impl From<User::Model> for UserInfo {
    fn from(user: User::Model) -> Self {
        Self {
            username: user.username,
            created: user.created,
        }
    }
}

#[derive(ApiResponse)]
enum CreateUserResponse {
    #[oai(status = 201)]
    Created(Json<UserInfo>),
    #[oai(status = 400)]
    BadRequest(PlainText<String>),
    #[oai(status = 409)]
    Conflict(PlainText<String>),
}

#[OpenApi]
impl Api {
    #[oai(path = "/users", method = "post", operation_id = "create_user")]
    async fn api_create_user(
        &self,
        services: Data<&Services>,
        body: Json<Credentials>,
    ) -> Result<CreateUserResponse, TodoError> {
        let username = body.username.trim();
        if username.is_empty() {
            return Ok(CreateUserResponse::BadRequest(PlainText(
                "username must not be empty".into(),
            )));
        }
        if body.password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            return Ok(CreateUserResponse::BadRequest(PlainText(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters long"
            ))));
        }

        let result = services
            .user_provider
            .lock()
            .await
            .create_user(username, &body.password)
            .await;

        match result {
            Ok(user) => Ok(CreateUserResponse::Created(Json(user.into()))),
            Err(error @ TodoError::UsernameTaken(_)) => {
                Ok(CreateUserResponse::Conflict(PlainText(error.to_string())))
            }
            Err(error) => Err(error),
        }
    }
}
