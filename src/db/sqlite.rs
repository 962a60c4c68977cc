use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{DataError, TodoStore};
use crate::models::{Priority, Todo, TodoPatch};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS todos (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        completed INTEGER NOT NULL DEFAULT 0,
        priority TEXT NOT NULL DEFAULT 'medium'
            CHECK (priority IN ('low', 'medium', 'high')),
        due_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

const COLUMNS: &str =
    "id, title, description, completed, priority, due_date, created_at, updated_at";

/// Local `todos` table behind a single shared connection.
#[derive(Clone)]
pub struct SqliteClient {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteClient {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DataError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DataError> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteClient {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DataError> {
        self.conn.lock().map_err(|_| DataError::Poisoned)
    }

    fn patch_rows(
        &self,
        id: &str,
        last_updated: Option<OffsetDateTime>,
        patch: &TodoPatch,
    ) -> Result<usize, DataError> {
        let mut updates = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(title) = &patch.title {
            updates.push("title = ?");
            params.push(Box::new(title.clone()));
        }
        if let Some(description) = &patch.description {
            updates.push("description = ?");
            params.push(Box::new(description.clone()));
        }
        if let Some(completed) = patch.completed {
            updates.push("completed = ?");
            params.push(Box::new(completed as i32));
        }
        if let Some(priority) = patch.priority {
            updates.push("priority = ?");
            params.push(Box::new(priority.as_str()));
        }
        if let Some(due_date) = patch.due_date {
            updates.push("due_date = ?");
            params.push(Box::new(format_timestamp(due_date)?));
        }
        updates.push("updated_at = ?");
        params.push(Box::new(format_timestamp(patch.updated_at)?));

        let mut query = format!("UPDATE todos SET {} WHERE id = ?", updates.join(", "));
        params.push(Box::new(id.to_string()));

        if let Some(last_updated) = last_updated {
            query.push_str(" AND updated_at = ?");
            params.push(Box::new(format_timestamp(last_updated)?));
        }

        let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let conn = self.lock()?;
        Ok(conn.execute(&query, params_refs.as_slice())?)
    }
}

impl TodoStore for SqliteClient {
    async fn list_todos(&self) -> Result<Vec<Todo>, DataError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM todos"))?;
        let todos = stmt
            .query_map([], todo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(todos)
    }

    async fn find_todo(&self, id: &str) -> Result<Option<Todo>, DataError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM todos WHERE id = ?1"))?;
        let mut rows = stmt.query([id])?;

        match rows.next()? {
            Some(row) => Ok(Some(todo_from_row(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_todo(&self, todo: &Todo) -> Result<(), DataError> {
        let due_date = todo.due_date.map(format_timestamp).transpose()?;
        let created_at = format_timestamp(todo.created_at)?;
        let updated_at = format_timestamp(todo.updated_at)?;

        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO todos ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            (
                &todo.id,
                &todo.title,
                &todo.description,
                todo.completed as i32,
                todo.priority.as_str(),
                due_date,
                created_at,
                updated_at,
            ),
        )?;
        Ok(())
    }

    async fn update_todo(&self, id: &str, patch: &TodoPatch) -> Result<(), DataError> {
        self.patch_rows(id, None, patch)?;
        Ok(())
    }

    async fn update_todo_if_unchanged(
        &self,
        id: &str,
        last_updated: OffsetDateTime,
        patch: &TodoPatch,
    ) -> Result<bool, DataError> {
        Ok(self.patch_rows(id, Some(last_updated), patch)? > 0)
    }

    async fn delete_todo(&self, id: &str) -> Result<(), DataError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM todos WHERE id = ?1", [id])?;
        Ok(())
    }
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String, DataError> {
    Ok(ts.format(&Rfc3339)?)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let priority: String = row.get(4)?;
    let due_date: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get::<_, i32>(3)? != 0,
        priority: priority
            .parse::<Priority>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        due_date: due_date.as_deref().map(|d| parse_timestamp(5, d)).transpose()?,
        created_at: parse_timestamp(6, &created_at)?,
        updated_at: parse_timestamp(7, &updated_at)?,
    })
}
