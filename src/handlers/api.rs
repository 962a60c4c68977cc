use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use tracing::{info, warn};

use crate::db::TodoStore;
use crate::error::AppError;
use crate::middleware::JsonBody;
use crate::models::{
    current_timestamp, ApiResponse, CreateTodo, NewTodo, Todo, TodoPatch, UpdateTodo,
};
use crate::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub async fn list_todos<C: TodoStore>(State(state): State<AppState<C>>) -> ApiResult<Vec<Todo>> {
    let todos = state
        .db
        .list_todos()
        .await
        .map_err(AppError::backend("Failed to fetch todos"))?;
    info!(count = todos.len(), "Listed todos");
    Ok(Json(ApiResponse::data(todos)))
}

pub async fn get_todo<C: TodoStore>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> ApiResult<Todo> {
    match state
        .db
        .find_todo(&id)
        .await
        .map_err(AppError::backend("Failed to fetch todo"))?
    {
        Some(todo) => Ok(Json(ApiResponse::data(todo))),
        None => Err(AppError::NotFound),
    }
}

pub async fn create_todo<C: TodoStore>(
    State(state): State<AppState<C>>,
    JsonBody(req): JsonBody<CreateTodo>,
) -> Result<(StatusCode, Json<ApiResponse<Todo>>), AppError> {
    let todo = Todo::new(NewTodo::try_from(req)?);

    state
        .db
        .insert_todo(&todo)
        .await
        .map_err(AppError::backend("Failed to create todo"))?;
    info!(id = %todo.id, title = %todo.title, priority = %todo.priority, "Created todo");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(todo).with_message("Todo created successfully")),
    ))
}

pub async fn update_todo<C: TodoStore>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateTodo>,
) -> ApiResult<()> {
    let patch = req.into_patch(current_timestamp())?;

    state
        .db
        .update_todo(&id, &patch)
        .await
        .map_err(AppError::backend("Failed to update todo"))?;
    info!(id = %id, touched_only = patch.is_empty(), "Updated todo");

    Ok(Json(ApiResponse::message("Todo updated successfully")))
}

pub async fn delete_todo<C: TodoStore>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state
        .db
        .delete_todo(&id)
        .await
        .map_err(AppError::backend("Failed to delete todo"))?;
    info!(id = %id, "Deleted todo");

    Ok(Json(ApiResponse::message("Todo deleted successfully")))
}

/// Flips `completed`. The write is conditional on the `updated_at` that was
/// read, so a concurrent change makes this request fail with 409 instead of
/// being overwritten.
pub async fn toggle_todo<C: TodoStore>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> ApiResult<Todo> {
    let mut todo = state
        .db
        .find_todo(&id)
        .await
        .map_err(AppError::backend("Failed to fetch todo"))?
        .ok_or(AppError::NotFound)?;

    let patch = TodoPatch::toggle(&todo);
    let changed = state
        .db
        .update_todo_if_unchanged(&id, todo.updated_at, &patch)
        .await
        .map_err(AppError::backend("Failed to toggle todo"))?;

    if !changed {
        warn!(id = %id, "Toggle lost a race with a concurrent update");
        return Err(AppError::Conflict);
    }

    todo.apply(&patch);
    info!(id = %id, completed = todo.completed, "Toggled todo");

    Ok(Json(
        ApiResponse::data(todo).with_message("Todo status toggled successfully"),
    ))
}
