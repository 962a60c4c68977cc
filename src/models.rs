use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("priority must be one of low, medium, high (got {0:?})")]
pub struct InvalidPriority(pub String);

impl FromStr for Priority {
    type Err = InvalidPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(InvalidPriority(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub due_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Todo {
    /// Builds a fresh entity from a validated request. Identifier and both
    /// timestamps are assigned here, never by the caller.
    pub fn new(new: NewTodo) -> Self {
        let now = current_timestamp();
        Todo {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            description: new.description,
            completed: false,
            priority: new.priority,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, patch: &TodoPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = Some(description.clone());
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = Some(due_date);
        }
        self.updated_at = patch.updated_at;
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTodo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
}

/// A create request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<OffsetDateTime>,
}

impl TryFrom<CreateTodo> for NewTodo {
    type Error = AppError;

    fn try_from(req: CreateTodo) -> Result<Self, Self::Error> {
        if req.title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }

        // An empty priority string falls back to the default like an absent one.
        let priority = match req.priority.as_deref() {
            None | Some("") => Priority::default(),
            Some(p) => p.parse::<Priority>()?,
        };

        Ok(NewTodo {
            title: req.title,
            description: req.description,
            priority,
            due_date: req.due_date,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub completed: Option<bool>,
}

impl UpdateTodo {
    pub fn into_patch(self, now: OffsetDateTime) -> Result<TodoPatch, AppError> {
        if let Some(ref title) = self.title {
            if title.trim().is_empty() {
                return Err(AppError::Validation("Title cannot be empty".to_string()));
            }
        }

        let priority = self
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?;

        Ok(TodoPatch {
            title: self.title,
            description: self.description,
            completed: self.completed,
            priority,
            due_date: self.due_date,
            updated_at: now,
        })
    }
}

/// Sparse set of column changes. Absent fields are left untouched by the
/// store; `updated_at` is always written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub due_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TodoPatch {
    pub fn touch(now: OffsetDateTime) -> Self {
        TodoPatch {
            title: None,
            description: None,
            completed: None,
            priority: None,
            due_date: None,
            updated_at: now,
        }
    }

    pub fn toggle(todo: &Todo) -> Self {
        TodoPatch {
            completed: Some(!todo.completed),
            ..TodoPatch::touch(next_timestamp(todo.updated_at))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}

/// Last timestamp handed out, in microseconds since the epoch.
static LAST_STAMP: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current time at microsecond precision. Every call in this process returns
/// a value strictly later than the one before it, so writes stamped here
/// never move `updated_at` backwards or repeat it.
pub fn current_timestamp() -> OffsetDateTime {
    stamp_after(i64::MIN)
}

/// Like [`current_timestamp`], but also strictly after `previous`, which may
/// have been written by another process.
pub fn next_timestamp(previous: OffsetDateTime) -> OffsetDateTime {
    stamp_after(micros(previous).saturating_add(1))
}

fn stamp_after(floor: i64) -> OffsetDateTime {
    let now = micros(OffsetDateTime::now_utc());
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(floor).max(last.saturating_add(1));
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return OffsetDateTime::UNIX_EPOCH + Duration::microseconds(next),
            Err(actual) => last = actual,
        }
    }
}

fn micros(at: OffsetDateTime) -> i64 {
    at.unix_timestamp_nanos().div_euclid(1_000) as i64
}

/// Uniform JSON envelope returned by every todo endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
            error: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}
