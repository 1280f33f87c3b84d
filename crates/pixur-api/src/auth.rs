use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use pixur_tasks::{AuthUserTask, CreateUserTask};
use pixur_types::api::{AuthRequest, AuthResponse, Claims, CreateUserRequest};
use pixur_types::{Context, Status};
use rand_core::OsRng;

use crate::error::ApiError;
use crate::users::user_response;
use crate::{AppState, run_task};

const TOKEN_LIFETIME_DAYS: i64 = 30;

/// Argon2id hash in PHC string form.
pub fn hash_password(secret: &str) -> Result<String, Status> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Status::internal(format!("can't hash secret: {}", e)))
}

pub fn verify_password(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(secret: &str, user_id: i64) -> Result<String, Status> {
    let exp = chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS);
    let claims = Claims {
        sub: user_id,
        exp: usize::try_from(exp.timestamp()).unwrap_or(0),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| Status::internal("can't create token").with_cause(e))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, Status> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| Status::unauthenticated("bad token").with_cause(e))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = CreateUserTask {
        db: Arc::clone(&state.db),
        now: chrono::Utc::now,
        hash_password,
        ident: req.ident,
        secret: req.secret,
        capability: req.capability,
        created_user: None,
    };
    let task = run_task(&state, ctx, task).await?;
    let user = task
        .created_user
        .ok_or_else(|| Status::internal("missing created user"))?;
    Ok((StatusCode::CREATED, Json(user_response(&user))))
}

pub async fn auth_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<Context>,
    Json(req): Json<AuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = AuthUserTask {
        db: Arc::clone(&state.db),
        now: chrono::Utc::now,
        verify_password,
        ident: req.ident,
        secret: req.secret,
        user: None,
    };
    let task = run_task(&state, ctx, task).await?;
    let user = task.user.ok_or_else(|| Status::internal("missing user"))?;
    let token = create_token(&state.jwt_secret, user.user_id)?;
    Ok(Json(AuthResponse {
        user_id: user.user_id,
        token,
    }))
}
