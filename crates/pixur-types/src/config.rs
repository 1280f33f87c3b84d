use serde::{Deserialize, Serialize};

use crate::caps::{CapSet, Capability};

/// Site wide knobs consulted by tasks. Supplied per request, read-only.
///
/// Missing bounds mean "unbounded" in that direction; missing reply toggles
/// mean the behaviour is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub min_comment_length: Option<i64>,
    pub max_comment_length: Option<i64>,
    pub min_ident_length: Option<i64>,
    pub max_ident_length: Option<i64>,
    pub min_file_name_length: Option<i64>,
    pub max_file_name_length: Option<i64>,
    pub min_url_length: Option<i64>,
    pub max_url_length: Option<i64>,
    pub min_tag_length: Option<i64>,
    pub max_tag_length: Option<i64>,
    pub anonymous_capability: CapSet,
    pub new_user_capability: CapSet,
    pub enable_pic_comment_self_reply: Option<bool>,
    pub enable_pic_comment_sibling_reply: Option<bool>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            min_comment_length: Some(1),
            max_comment_length: Some(16384),
            min_ident_length: Some(1),
            max_ident_length: Some(128),
            min_file_name_length: Some("a.a".len() as i64),
            max_file_name_length: Some(255),
            min_url_length: Some("http://".len() as i64),
            max_url_length: Some(2000),
            min_tag_length: Some(1),
            max_tag_length: Some(64),
            anonymous_capability: CapSet::of(&[Capability::UserCreate]),
            new_user_capability: CapSet::of(&[
                Capability::PicRead,
                Capability::PicIndex,
                Capability::PicUpdateViewCounter,
                Capability::PicTagCreate,
                Capability::PicCommentCreate,
                Capability::PicVoteCreate,
                Capability::UserReadSelf,
            ]),
            enable_pic_comment_self_reply: None,
            enable_pic_comment_sibling_reply: None,
        }
    }
}

/// Resolves an optional (min, max) pair into concrete inclusive bounds.
pub fn bounds(min: Option<i64>, max: Option<i64>) -> (i64, i64) {
    (min.unwrap_or(i64::MIN), max.unwrap_or(i64::MAX))
}
