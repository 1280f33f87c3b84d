use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use pixur_tasks::{AddPicCommentTask, IncrementViewCountTask, PurgePicTask};
use pixur_types::api::{AddPicCommentRequest, PicCommentResponse, ViewCountResponse};
use pixur_types::{Context, Status};
use tracing::info;

use crate::error::ApiError;
use crate::{AppState, run_task};

pub async fn add_pic_comment(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Path(pic_id): Path<i64>,
    Json(req): Json<AddPicCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = AddPicCommentTask {
        db: Arc::clone(&state.db),
        now: chrono::Utc::now,
        pic_id,
        comment_parent_id: req.comment_parent_id,
        text: req.text,
        ext: req.ext,
        unfiltered_pic_comment: None,
        pic_comment: None,
    };
    let task = run_task(&state, ctx, task).await?;
    let pc = task
        .pic_comment
        .ok_or_else(|| Status::internal("missing comment"))?;
    Ok((
        StatusCode::CREATED,
        Json(PicCommentResponse {
            pic_id: pc.pic_id,
            comment_id: pc.comment_id,
            comment_parent_id: pc.comment_parent_id,
            text: pc.text,
            user_id: pc.user_id,
            created_ts: pc.created_ts,
        }),
    ))
}

pub async fn increment_view_count(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Path(pic_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let task = IncrementViewCountTask {
        db: Arc::clone(&state.db),
        now: chrono::Utc::now,
        pic_id,
        view_count: 0,
    };
    let task = run_task(&state, ctx, task).await?;
    Ok(Json(ViewCountResponse {
        pic_id,
        view_count: task.view_count,
    }))
}

pub async fn purge_pic(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Path(pic_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let task = PurgePicTask {
        db: Arc::clone(&state.db),
        now: chrono::Utc::now,
        pix_path: state.pix_path.clone(),
        remove: Box::new(|p: &std::path::Path| std::fs::remove_file(p)),
        pic_id,
    };
    run_task(&state, ctx, task).await?;
    info!(pic_id, "purged pic");
    Ok(StatusCode::NO_CONTENT)
}
