//! JSON over HTTP front end. Handlers decode a request, build the matching
//! task, run it on the blocking pool and translate the outcome.

pub mod auth;
pub mod error;
pub mod keys;
pub mod middleware;
pub mod pics;
pub mod users;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};
use pixur_db::Db;
use pixur_tasks::{Task, TaskRunner};
use pixur_types::{Context, Status};
use tracing::error;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<dyn Db>,
    pub runner: TaskRunner,
    pub jwt_secret: String,
    /// Root directory of pic files.
    pub pix_path: PathBuf,
    pub conf: Arc<pixur_types::Configuration>,
    /// Deadline given to each request's tasks. `None` means unbounded.
    pub request_timeout: Option<Duration>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/users", post(auth::create_user))
        .route("/api/auth", post(auth::auth_user))
        .route(
            "/api/users/{user_id}",
            get(users::lookup_user).patch(users::update_user),
        )
        .route("/api/users/{user_id}/events", get(users::find_user_events))
        .route("/api/pics/{pic_id}/comments", post(pics::add_pic_comment))
        .route("/api/pics/{pic_id}/views", post(pics::increment_view_count))
        .route("/api/pics/{pic_id}", delete(pics::purge_pic))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_context,
        ))
        .with_state(state)
}

/// Runs `task` to completion off the async runtime and hands it back so the
/// caller can read its outputs.
pub(crate) async fn run_task<T>(state: &AppState, ctx: Context, mut task: T) -> Result<T, ApiError>
where
    T: Task + Send + 'static,
{
    let runner = state.runner.clone();
    tokio::task::spawn_blocking(move || runner.run(&ctx, &mut task).map(|()| task))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError(Status::internal("task did not finish"))
        })?
        .map_err(ApiError)
}
