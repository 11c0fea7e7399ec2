use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use todogate_common::helpers::hash::{generate_token_secret, hash_password, verify_password_hash};
use todogate_common::{Secret, TodoError};
use todogate_db_entities::{ApiToken, User};
use tokio::sync::Mutex;
use tracing::*;
use uuid::Uuid;

use super::UserProvider;

pub struct DatabaseUserProvider {
    db: Arc<Mutex<DatabaseConnection>>,
}

impl DatabaseUserProvider {
    pub fn new(db: &Arc<Mutex<DatabaseConnection>>) -> Self {
        Self { db: db.clone() }
    }
}

impl UserProvider for DatabaseUserProvider {
    async fn create_user(
        &mut self,
        username: &str,
        password: &Secret,
    ) -> Result<User::Model, TodoError> {
        let db = self.db.lock().await;

        if User::Entity::find()
            .filter(User::Column::Username.eq(username))
            .one(&*db)
            .await?
            .is_some()
        {
            return Err(TodoError::UsernameTaken(username.to_owned()));
        }

        let values = User::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_owned()),
            password_hash: Set(hash_password(password.expose_secret())?),
            created: Set(Utc::now()),
        };
        let user = values.insert(&*db).await?;
        info!(username = %user.username, "Created user");
        Ok(user)
    }

    async fn find_user(&mut self, username: &str) -> Result<Option<User::Model>, TodoError> {
        let db = self.db.lock().await;
        Ok(User::Entity::find()
            .filter(User::Column::Username.eq(username))
            .one(&*db)
            .await?)
    }

    async fn authorize(
        &mut self,
        username: &str,
        password: &Secret,
    ) -> Result<Option<User::Model>, TodoError> {
        let Some(user) = self.find_user(username).await? else {
            debug!(%username, "Login attempt for unknown user");
            return Ok(None);
        };

        match verify_password_hash(password.expose_secret(), &user.password_hash) {
            Ok(true) => Ok(Some(user)),
            Ok(false) => {
                debug!(%username, "Password mismatch");
                Ok(None)
            }
            Err(e) => {
                error!(%username, "Stored password hash is invalid: {e}");
                Ok(None)
            }
        }
    }

    async fn issue_api_token(
        &mut self,
        user: &User::Model,
        label: &str,
        ttl: Duration,
    ) -> Result<(ApiToken::Model, Secret), TodoError> {
        let db = self.db.lock().await;
        let secret = generate_token_secret();
        let now = Utc::now();

        let values = ApiToken::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            label: Set(label.to_owned()),
            secret: Set(secret.expose_secret().to_owned()),
            created: Set(now),
            expiry: Set(now + chrono::Duration::from_std(ttl).map_err(TodoError::other)?),
        };
        let token = values.insert(&*db).await?;
        info!(username = %user.username, label = %token.label, "Issued API token");
        Ok((token, secret))
    }

    async fn validate_api_token(&mut self, secret: &str) -> Result<Option<User::Model>, TodoError> {
        let db = self.db.lock().await;
        let Some(token) = ApiToken::Entity::find()
            .filter(ApiToken::Column::Secret.eq(secret))
            .filter(ApiToken::Column::Expiry.gt(Utc::now()))
            .one(&*db)
            .await?
        else {
            return Ok(None);
        };

        Ok(User::Entity::find_by_id(token.user_id).one(&*db).await?)
    }
}
