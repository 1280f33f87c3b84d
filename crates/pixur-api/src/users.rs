use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use pixur_db::models::{User, UserEvent};
use pixur_tasks::{FindUserEventsTask, LookupUserTask, UpdateUserTask};
use pixur_types::api::{
    FindUserEventsQuery, FindUserEventsResponse, LookupUserQuery, PublicUserInfo,
    UpdateUserRequest, UserEventResponse, UserResponse,
};
use pixur_types::{Context, Status};

use crate::error::ApiError;
use crate::keys::{decode_event_key, encode_event_key};
use crate::{AppState, run_task};

pub(crate) fn user_response(u: &User) -> UserResponse {
    UserResponse {
        user_id: u.user_id,
        ident: u.ident.clone(),
        capability: u.capability.to_vec(),
        version: u.version(),
        created_ts: u.created_ts,
        modified_ts: u.modified_ts,
        last_seen_ts: u.last_seen_ts,
    }
}

fn user_event_response(ue: &UserEvent) -> UserEventResponse {
    let key = pixur_tasks::UserEventKey::of(ue);
    UserEventResponse {
        user_id: key.user_id,
        created_ts: key.created_ts,
        index: key.index,
        kind: ue.evt.name(),
        pic_id: ue.evt.pic_id(),
        comment_id: ue.evt.comment_id(),
    }
}

/// `user_id` 0 means the caller.
pub async fn lookup_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Path(user_id): Path<i64>,
    Query(query): Query<LookupUserQuery>,
) -> Result<Response, ApiError> {
    let task = LookupUserTask {
        db: Arc::clone(&state.db),
        object_user_id: user_id,
        public_only: query.public,
        user: None,
    };
    let task = run_task(&state, ctx, task).await?;
    let user = task.user.ok_or_else(|| Status::internal("missing user"))?;
    if query.public {
        return Ok(Json(PublicUserInfo {
            user_id: user.user_id,
            ident: user.ident,
            created_ts: user.created_ts,
        })
        .into_response());
    }
    Ok(Json(user_response(&user)).into_response())
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = UpdateUserTask {
        db: Arc::clone(&state.db),
        now: chrono::Utc::now,
        object_user_id: user_id,
        version: req.version,
        set_capability: req.set_capability,
        clear_capability: req.clear_capability,
        object_user: None,
    };
    let task = run_task(&state, ctx, task).await?;
    let user = task
        .object_user
        .ok_or_else(|| Status::internal("missing user"))?;
    Ok(Json(user_response(&user)))
}

pub async fn find_user_events(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Path(user_id): Path<i64>,
    Query(query): Query<FindUserEventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let start = query
        .start
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(decode_event_key)
        .transpose()?;
    let task = FindUserEventsTask {
        db: Arc::clone(&state.db),
        object_user_id: user_id,
        start,
        ascending: query.asc,
        user_events: vec![],
        next: None,
        prev: None,
    };
    let task = run_task(&state, ctx, task).await?;
    Ok(Json(FindUserEventsResponse {
        events: task.user_events.iter().map(user_event_response).collect(),
        next: task.next.as_ref().map(encode_event_key),
        prev: task.prev.as_ref().map(encode_event_key),
    }))
}
