use std::sync::Arc;

use http::StatusCode;
use poem::session::Session;
use poem::web::Data;
use poem::{Endpoint, EndpointExt, FromRequest, Request};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use todogate_common::TodoError;
use todogate_core::{Services, UserProvider};
use todogate_db_entities::User;

static AUTH_SESSION_KEY: &str = "auth";
pub static SESSION_COOKIE_NAME: &str = "todogate-session";

pub trait SessionExt {
    fn get_auth(&self) -> Option<SessionAuthorization>;
    fn set_auth(&self, auth: SessionAuthorization);
}

impl SessionExt for Session {
    fn get_auth(&self) -> Option<SessionAuthorization> {
        self.get(AUTH_SESSION_KEY)
    }

    fn set_auth(&self, auth: SessionAuthorization) {
        self.set(AUTH_SESSION_KEY, auth);
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum SessionAuthorization {
    User(String),
}

impl SessionAuthorization {
    pub fn username(&self) -> &String {
        match self {
            Self::User(username) => username,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum RequestAuthorization {
    Session(SessionAuthorization),
    UserToken { username: String },
}

impl RequestAuthorization {
    pub fn username(&self) -> &String {
        match self {
            Self::Session(auth) => auth.username(),
            Self::UserToken { username } => username,
        }
    }
}

fn bearer_token(req: &Request) -> poem::Result<Option<String>> {
    let Some(header) = req.headers().get(http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let header = header.to_str().map_err(poem::error::BadRequest)?;
    Ok(match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Some(token.trim().to_owned())
        }
        _ => None,
    })
}

pub(crate) async fn inject_request_authorization<E: Endpoint + 'static>(
    ep: Arc<E>,
    req: Request,
) -> poem::Result<E::Output> {
    let session = <&Session>::from_request_without_body(&req).await?;
    let services = Data::<&Services>::from_request_without_body(&req).await?;

    let auth = match session.get_auth() {
        Some(auth) => Some(RequestAuthorization::Session(auth)),
        None => match bearer_token(&req)? {
            Some(token) => services
                .user_provider
                .lock()
                .await
                .validate_api_token(&token)
                .await?
                .map(|user| RequestAuthorization::UserToken {
                    username: user.username,
                }),
            None => None,
        },
    };

    if let Some(auth) = auth {
        // data_opt would change the return type from E::Output
        Ok(ep.data(auth).call(req).await?)
    } else {
        Ok(ep.call(req).await?)
    }
}

pub async fn _inner_auth<E: Endpoint + 'static>(
    ep: Arc<E>,
    req: Request,
) -> poem::Result<Option<E::Output>> {
    let auth = Option::<Data<&RequestAuthorization>>::from_request_without_body(&req).await?;
    if auth.is_none() {
        return Ok(None);
    }
    ep.call(req).await.map(Some)
}

pub fn endpoint_auth<E: Endpoint + 'static>(e: E) -> impl Endpoint<Output = E::Output> {
    e.around(|ep, req| async move {
        _inner_auth(ep, req)
            .await?
            .ok_or_else(|| poem::Error::from_status(StatusCode::UNAUTHORIZED))
    })
}

pub async fn get_user(
    auth: &RequestAuthorization,
    db: &DatabaseConnection,
) -> Result<Option<User::Model>, TodoError> {
    Ok(User::Entity::find()
        .filter(User::Column::Username.eq(auth.username()))
        .one(db)
        .await?)
}
