use chrono::{DateTime, Utc};
use poem::session::Session;
use poem::web::Data;
use poem_openapi::payload::Json;
use poem_openapi::{ApiResponse, Object, OpenApi};
use todogate_common::{Secret, TodoError};
use todogate_core::{Services, UserProvider};
use tracing::*;

use super::common::Credentials;
use crate::common::{SessionAuthorization, SessionExt};

pub struct Api;

#[derive(ApiResponse)]
enum LoginResponse {
    #[oai(status = 201)]
    Success,

    #[oai(status = 401)]
    Failure,
}

#[derive(ApiResponse)]
enum LogoutResponse {
    #[oai(status = 201)]
    Success,
}

#[derive(Object)]
struct TokenRequest {
    username: String,
    password: Secret,
    label: Option<String>,
}

#[derive(Object)]
struct IssuedToken {
    token: String,
    expiry: DateTime<Utc>,
}

#[derive(ApiResponse)]
enum IssueTokenResponse {
    #[oai(status = 201)]
    Created(Json<IssuedToken>),

    #[oai(status = 401)]
    Failure,
}

#[OpenApi]
impl Api {
    #[oai(path = "/auth/login", method = "post", operation_id = "login")]
    async fn api_auth_login(
        &self,
        session: &Session,
        services: Data<&Services>,
        body: Json<Credentials>,
    ) -> Result<LoginResponse, TodoError> {
        let Credentials { username, password } = body.0;
        let user = services
            .user_provider
            .lock()
            .await
            .authorize(&username, &password)
            .await?;

        match user {
            Some(user) => {
                info!(username = %user.username, "Authenticated");
                session.set_auth(SessionAuthorization::User(user.username));
                Ok(LoginResponse::Success)
            }
            None => {
                warn!(%username, "Login failed");
                Ok(LoginResponse::Failure)
            }
        }
    }

    #[oai(path = "/auth/logout", method = "post", operation_id = "logout")]
    async fn api_auth_logout(&self, session: &Session) -> poem::Result<LogoutResponse> {
        session.purge();
        Ok(LogoutResponse::Success)
    }

    #[oai(path = "/auth/token", method = "post", operation_id = "issue_token")]
    async fn api_auth_issue_token(
        &self,
        services: Data<&Services>,
        body: Json<TokenRequest>,
    ) -> Result<IssueTokenResponse, TodoError> {
        let ttl = services.config.lock().await.store.http.api_token_ttl;
        let mut user_provider = services.user_provider.lock().await;

        let Some(user) = user_provider
            .authorize(&body.username, &body.password)
            .await?
        else {
            warn!(username = %body.username, "Token request with bad credentials");
            return Ok(IssueTokenResponse::Failure);
        };

        let label = body.label.as_deref().unwrap_or("api");
        let (token, secret) = user_provider.issue_api_token(&user, label, ttl).await?;

        Ok(IssueTokenResponse::Created(Json(IssuedToken {
            token: secret.expose_secret().to_owned(),
            expiry: token.expiry,
        })))
    }
}
