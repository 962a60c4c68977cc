pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use axum::{
    routing::{get, patch},
    Router,
};
use db::TodoStore;
use middleware::Cors;

#[derive(Clone)]
pub struct AppState<C> {
    pub db: C,
    pub cors: Cors,
}

pub fn create_app<C: TodoStore>(state: AppState<C>) -> Router {
    let cors = state.cors.clone();

    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/todos",
            get(handlers::api::list_todos::<C>).post(handlers::api::create_todo::<C>),
        )
        .route(
            "/api/todos/{id}",
            get(handlers::api::get_todo::<C>)
                .put(handlers::api::update_todo::<C>)
                .delete(handlers::api::delete_todo::<C>),
        )
        .route(
            "/api/todos/{id}/toggle",
            patch(handlers::api::toggle_todo::<C>),
        )
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(cors, middleware::cors))
                .layer(tower_http::compression::CompressionLayer::new())
                .layer(tower_http::catch_panic::CatchPanicLayer::custom(
                    error::panic_response,
                )),
        )
        .with_state(state)
}
