use chrono::Utc;
use poem::web::Data;
use poem_openapi::param::Path;
use poem_openapi::payload::{Json, PlainText};
use poem_openapi::{ApiResponse, Object, OpenApi};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use todogate_common::TodoError;
use todogate_core::Services;
use todogate_db_entities::{Todo, User};

use crate::common::{endpoint_auth, get_user, RequestAuthorization};

pub struct Api;

#[derive(ApiResponse)]
enum GetTodosResponse {
    #[oai(status = 200)]
    Ok(Json<Vec<Todo::Model>>),
    #[oai(status = 401)]
    Unauthorized,
}

#[derive(ApiResponse)]
enum GetTodoResponse {
    #[oai(status = 200)]
    Ok(Json<Todo::Model>),
    #[oai(status = 401)]
    Unauthorized,
    #[oai(status = 404)]
    NotFound,
}

#[derive(Object)]
struct NewTodo {
    title: String,
}

#[derive(ApiResponse)]
enum CreateTodoResponse {
    #[oai(status = 201)]
    Created(Json<Todo::Model>),
    #[oai(status = 400)]
    BadRequest(PlainText<String>),
    #[oai(status = 401)]
    Unauthorized,
}

#[derive(Object)]
struct UpdateTodo {
    title: String,
    is_complete: bool,
}

#[derive(ApiResponse)]
enum UpdateTodoResponse {
    #[oai(status = 200)]
    Ok(Json<Todo::Model>),
    #[oai(status = 400)]
    BadRequest(PlainText<String>),
    #[oai(status = 401)]
    Unauthorized,
    #[oai(status = 404)]
    NotFound,
}

#[derive(ApiResponse)]
enum DeleteTodoResponse {
    #[oai(status = 204)]
    Deleted,
    #[oai(status = 401)]
    Unauthorized,
    #[oai(status = 404)]
    NotFound,
}

#[derive(Object)]
struct DeletedTodos {
    deleted: u64,
}

#[derive(ApiResponse)]
enum DeleteTodosResponse {
    #[oai(status = 200)]
    Ok(Json<DeletedTodos>),
    #[oai(status = 401)]
    Unauthorized,
}

fn validate_title(title: &str) -> Option<String> {
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_owned())
    }
}

/// Items of other users are reported as missing
async fn find_own_todo(
    db: &DatabaseConnection,
    user: &User::Model,
    id: i32,
) -> Result<Option<Todo::Model>, TodoError> {
    Ok(Todo::Entity::find_by_id(id)
        .filter(Todo::Column::OwnerId.eq(user.id))
        .one(db)
        .await?)
}

#[OpenApi]
impl Api {
    #[oai(
        path = "/todos",
        method = "get",
        operation_id = "get_todos",
        transform = "endpoint_auth"
    )]
    async fn api_get_todos(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
    ) -> Result<GetTodosResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(GetTodosResponse::Unauthorized);
        };

        let todos = user
            .find_related(Todo::Entity)
            .order_by_asc(Todo::Column::Id)
            .all(&*db)
            .await?;

        Ok(GetTodosResponse::Ok(Json(todos)))
    }

    #[oai(
        path = "/todos/:id",
        method = "get",
        operation_id = "get_todo",
        transform = "endpoint_auth"
    )]
    async fn api_get_todo(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
        id: Path<i32>,
    ) -> Result<GetTodoResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(GetTodoResponse::Unauthorized);
        };

        Ok(match find_own_todo(&db, &user, id.0).await? {
            Some(todo) => GetTodoResponse::Ok(Json(todo)),
            None => GetTodoResponse::NotFound,
        })
    }

    #[oai(
        path = "/todos",
        method = "post",
        operation_id = "create_todo",
        transform = "endpoint_auth"
    )]
    async fn api_create_todo(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
        body: Json<NewTodo>,
    ) -> Result<CreateTodoResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(CreateTodoResponse::Unauthorized);
        };

        let Some(title) = validate_title(&body.title) else {
            return Ok(CreateTodoResponse::BadRequest(PlainText(
                "title must not be empty".into(),
            )));
        };

        let todo = Todo::ActiveModel {
            title: Set(title),
            is_complete: Set(false),
            owner_id: Set(user.id),
            created: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*db)
        .await?;

        Ok(CreateTodoResponse::Created(Json(todo)))
    }

    #[oai(
        path = "/todos/:id",
        method = "put",
        operation_id = "update_todo",
        transform = "endpoint_auth"
    )]
    async fn api_update_todo(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
        id: Path<i32>,
        body: Json<UpdateTodo>,
    ) -> Result<UpdateTodoResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(UpdateTodoResponse::Unauthorized);
        };

        let Some(title) = validate_title(&body.title) else {
            return Ok(UpdateTodoResponse::BadRequest(PlainText(
                "title must not be empty".into(),
            )));
        };

        let Some(todo) = find_own_todo(&db, &user, id.0).await? else {
            return Ok(UpdateTodoResponse::NotFound);
        };

        let mut model: Todo::ActiveModel = todo.into();
        model.title = Set(title);
        model.is_complete = Set(body.is_complete);
        let todo = model.update(&*db).await?;

        Ok(UpdateTodoResponse::Ok(Json(todo)))
    }

    #[oai(
        path = "/todos/:id/complete",
        method = "put",
        operation_id = "complete_todo",
        transform = "endpoint_auth"
    )]
    async fn api_complete_todo(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
        id: Path<i32>,
    ) -> Result<GetTodoResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(GetTodoResponse::Unauthorized);
        };

        let Some(todo) = find_own_todo(&db, &user, id.0).await? else {
            return Ok(GetTodoResponse::NotFound);
        };

        let mut model: Todo::ActiveModel = todo.into();
        model.is_complete = Set(true);
        let todo = model.update(&*db).await?;

        Ok(GetTodoResponse::Ok(Json(todo)))
    }

    #[oai(
        path = "/todos/:id",
        method = "delete",
        operation_id = "delete_todo",
        transform = "endpoint_auth"
    )]
    async fn api_delete_todo(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
        id: Path<i32>,
    ) -> Result<DeleteTodoResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(DeleteTodoResponse::Unauthorized);
        };

        let Some(todo) = find_own_todo(&db, &user, id.0).await? else {
            return Ok(DeleteTodoResponse::NotFound);
        };

        todo.delete(&*db).await?;
        Ok(DeleteTodoResponse::Deleted)
    }

    #[oai(
        path = "/todos",
        method = "delete",
        operation_id = "delete_todos",
        transform = "endpoint_auth"
    )]
    async fn api_delete_todos(
        &self,
        auth: Data<&RequestAuthorization>,
        services: Data<&Services>,
    ) -> Result<DeleteTodosResponse, TodoError> {
        let db = services.db.lock().await;

        let Some(user) = get_user(&auth, &db).await? else {
            return Ok(DeleteTodosResponse::Unauthorized);
        };

        let result = Todo::Entity::delete_many()
            .filter(Todo::Column::OwnerId.eq(user.id))
            .exec(&*db)
            .await?;

        Ok(DeleteTodosResponse::Ok(Json(DeletedTodos {
            deleted: result.rows_affected,
        })))
    }
}
