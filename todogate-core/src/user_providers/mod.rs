mod db;
use std::time::Duration;

pub use db::DatabaseUserProvider;
use enum_dispatch::enum_dispatch;
use todogate_common::{Secret, TodoError};
use todogate_db_entities::{ApiToken, User};

#[enum_dispatch]
pub enum UserProviderEnum {
    Database(DatabaseUserProvider),
}

#[enum_dispatch(UserProviderEnum)]
#[allow(async_fn_in_trait)]
pub trait UserProvider {
    /// Fails with [TodoError::UsernameTaken] if the name is in use
    async fn create_user(
        &mut self,
        username: &str,
        password: &Secret,
    ) -> Result<User::Model, TodoError>;

    async fn find_user(&mut self, username: &str) -> Result<Option<User::Model>, TodoError>;

    /// Returns the user only if the password matches
    async fn authorize(
        &mut self,
        username: &str,
        password: &Secret,
    ) -> Result<Option<User::Model>, TodoError>;

    async fn issue_api_token(
        &mut self,
        user: &User::Model,
        label: &str,
        ttl: Duration,
    ) -> Result<(ApiToken::Model, Secret), TodoError>;

    /// Resolves an unexpired token secret to its owner
    async fn validate_api_token(&mut self, secret: &str) -> Result<Option<User::Model>, TodoError>;
}
