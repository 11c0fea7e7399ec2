use std::error::Error;

use poem::error::ResponseError;

#[derive(thiserror::Error, Debug)]
pub enum TodoError {
    #[error("database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("deserialization failed: {0}")]
    DeserializeJson(#[from] serde_json::Error),
    #[error("password hash error: {0}")]
    PasswordHash(String),
    #[error("invalid rate limiter configuration for {section}: {reason}")]
    RateLimiterInvalidConfig {
        section: &'static str,
        reason: String,
    },
    #[error("user {0} already exists")]
    UsernameTaken(String),
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ResponseError for TodoError {
    fn status(&self) -> poem::http::StatusCode {
        poem::http::StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl TodoError {
    pub fn other<E: Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}

impl poem_openapi::ApiResponse for TodoError {
    fn meta() -> poem_openapi::registry::MetaResponses {
        poem_openapi::registry::MetaResponses {
            responses: Vec::new(),
        }
    }

    fn register(_registry: &mut poem_openapi::registry::Registry) {}
}
