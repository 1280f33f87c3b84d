use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::caps::Capability;

// -- JWT Claims --

/// Bearer token claims. `sub` is the numeric user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub exp: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub ident: String,
    pub secret: String,
    /// Explicit capabilities instead of the configured new user default.
    #[serde(default)]
    pub capability: Option<Vec<Capability>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthRequest {
    pub ident: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: i64,
    pub ident: String,
    pub capability: Vec<Capability>,
    pub version: i64,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
    pub last_seen_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PublicUserInfo {
    pub user_id: i64,
    pub ident: String,
    pub created_ts: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LookupUserQuery {
    /// Only ask for, and only return, the public fields.
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub version: i64,
    #[serde(default)]
    pub set_capability: Vec<Capability>,
    #[serde(default)]
    pub clear_capability: Vec<Capability>,
}

// -- User events --

#[derive(Debug, Deserialize)]
pub struct FindUserEventsQuery {
    /// Opaque key returned as `next`/`prev` by a previous page.
    pub start: Option<String>,
    #[serde(default)]
    pub asc: bool,
}

#[derive(Debug, Serialize)]
pub struct UserEventResponse {
    pub user_id: i64,
    pub created_ts: i64,
    pub index: i64,
    pub kind: &'static str,
    pub pic_id: i64,
    pub comment_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct FindUserEventsResponse {
    pub events: Vec<UserEventResponse>,
    pub next: Option<String>,
    pub prev: Option<String>,
}

// -- Pics --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddPicCommentRequest {
    #[serde(default)]
    pub comment_parent_id: i64,
    pub text: String,
    #[serde(default)]
    pub ext: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct PicCommentResponse {
    pub pic_id: i64,
    pub comment_id: i64,
    pub comment_parent_id: i64,
    pub text: String,
    pub user_id: i64,
    pub created_ts: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ViewCountResponse {
    pub pic_id: i64,
    pub view_count: i64,
}
