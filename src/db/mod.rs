//! Data clients for the `todos` table.
//!
//! Handlers only see [`TodoStore`]. [`RestClient`] talks to the hosted
//! database; [`SqliteClient`] keeps the same table locally and is what the
//! test suite runs against.

mod rest;
mod sqlite;

use std::future::Future;

use time::OffsetDateTime;

use crate::models::{Todo, TodoPatch};

pub use rest::RestClient;
pub use sqlite::SqliteClient;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("database responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp formatting failed: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("database lock poisoned")]
    Poisoned,
}

/// Table operations the todo handlers need. Every filter is by identifier.
pub trait TodoStore: Clone + Send + Sync + 'static {
    fn list_todos(&self) -> impl Future<Output = Result<Vec<Todo>, DataError>> + Send;

    fn find_todo(&self, id: &str) -> impl Future<Output = Result<Option<Todo>, DataError>> + Send;

    fn insert_todo(&self, todo: &Todo) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Applies `patch` to the row matching `id`. Matching nothing is not an
    /// error.
    fn update_todo(
        &self,
        id: &str,
        patch: &TodoPatch,
    ) -> impl Future<Output = Result<(), DataError>> + Send;

    /// Applies `patch` only while the row still carries `last_updated`.
    /// Returns whether a row was changed.
    fn update_todo_if_unchanged(
        &self,
        id: &str,
        last_updated: OffsetDateTime,
        patch: &TodoPatch,
    ) -> impl Future<Output = Result<bool, DataError>> + Send;

    /// Removes the row matching `id`, if any.
    fn delete_todo(&self, id: &str) -> impl Future<Output = Result<(), DataError>> + Send;
}
