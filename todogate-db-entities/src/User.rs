use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created: DateTime<Utc>,
}

impl Related<super::Todo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Todos.def()
    }
}

impl Related<super::ApiToken::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiTokens.def()
    }
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Todos,
    ApiTokens,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Todos => Entity::has_many(super::Todo::Entity)
                .from(Column::Id)
                .to(super::Todo::Column::OwnerId)
                .into(),
            Self::ApiTokens => Entity::has_many(super::ApiToken::Entity)
                .from(Column::Id)
                .to(super::ApiToken::Column::UserId)
                .into(),
        }
    }
}

impl ActiveModelBehavior for ActiveModel {}
