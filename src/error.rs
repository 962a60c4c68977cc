use std::any::Any;

use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use tracing::error;

use crate::db::DataError;
use crate::models::{ApiResponse, InvalidPriority};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("Todo not found")]
    NotFound,
    #[error("Todo was modified concurrently")]
    Conflict,
    #[error("{action}: {source}")]
    Backend {
        action: &'static str,
        #[source]
        source: DataError,
    },
}

impl AppError {
    /// Wraps a data client failure with the action that was attempted, for
    /// use with `map_err`.
    pub fn backend(action: &'static str) -> impl FnOnce(DataError) -> AppError {
        move |source| AppError::Backend { action, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict => StatusCode::CONFLICT,
            AppError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Backend { action, source } = &self {
            error!(action = *action, error = %source, "Data client call failed");
        }

        let status = self.status();
        (status, Json(ApiResponse::error(self.to_string()))).into_response()
    }
}

/// Turns a handler panic into the 500 envelope. Used with
/// `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error("Internal server error")),
    )
        .into_response()
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request data: {}", rejection.body_text()))
    }
}

impl From<InvalidPriority> for AppError {
    fn from(err: InvalidPriority) -> Self {
        AppError::Validation(err.to_string())
    }
}
