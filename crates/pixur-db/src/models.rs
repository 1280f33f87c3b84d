//! Persisted row types. Each is stored JSON-encoded in the `data` column of
//! its table, next to the key columns derived from it in [`crate::tables`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use pixur_types::{CapSet, Status};
use serde::{Deserialize, Serialize};

/// Owner id of rows created without an identified user.
pub const ANONYMOUS_USER_ID: i64 = 0;

/// Nanoseconds since the epoch, saturating outside the representable range.
pub fn ts_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt().unwrap_or(if ts.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

macro_rules! timestamped {
    ($($model:ty),+ $(,)?) => {$(
        impl $model {
            pub fn set_created_time(&mut self, now: DateTime<Utc>) {
                self.created_ts = now;
            }

            pub fn set_modified_time(&mut self, now: DateTime<Utc>) {
                self.modified_ts = now;
            }

            /// Optimistic concurrency token; changes on every update.
            pub fn version(&self) -> i64 {
                ts_nanos(self.modified_ts)
            }
        }
    )+};
}

timestamped!(Pic, Tag, PicTag, PicComment, PicVote, User, UserEvent);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mime {
    #[default]
    Unknown,
    Jpeg,
    Gif,
    Png,
    Webm,
    Mp4,
}

impl Mime {
    pub fn ext(self) -> Option<&'static str> {
        match self {
            Mime::Unknown => None,
            Mime::Jpeg => Some("jpg"),
            Mime::Gif => Some("gif"),
            Mime::Png => Some("png"),
            Mime::Webm => Some("webm"),
            Mime::Mp4 => Some("mp4"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileSource {
    pub url: String,
    pub referrer: String,
    pub user_id: i64,
    pub created_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Thumbnail {
    pub index: i64,
    pub mime: Mime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionReason {
    #[default]
    Unknown,
    None,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeletionStatus {
    pub marked_deleted_ts: Option<DateTime<Utc>>,
    pub pending_deleted_ts: Option<DateTime<Utc>>,
    pub actual_deleted_ts: Option<DateTime<Utc>>,
    pub details: String,
    pub reason: DeletionReason,
    pub temporary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pic {
    pub pic_id: i64,
    pub file_size: i64,
    pub mime: Mime,
    pub width: i64,
    pub height: i64,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
    #[serde(default)]
    pub deletion_status: Option<DeletionStatus>,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub source: Vec<FileSource>,
    #[serde(default)]
    pub file_name: Vec<String>,
    #[serde(default)]
    pub thumbnail: Vec<Thumbnail>,
}

impl Pic {
    pub fn soft_deleted(&self) -> bool {
        self.deletion_status
            .as_ref()
            .is_some_and(|d| d.marked_deleted_ts.is_some())
    }

    pub fn hard_deleted(&self) -> bool {
        self.deletion_status
            .as_ref()
            .is_some_and(|d| d.actual_deleted_ts.is_some())
    }
}

fn pic_base_dir(pix_path: &Path, pic_id: i64) -> PathBuf {
    pix_path.join(format!("{:02x}", pic_id.rem_euclid(256)))
}

/// Where the primary file of a pic lives under `pix_path`.
pub fn pic_file_path(pix_path: &Path, pic_id: i64, mime: Mime) -> Result<PathBuf, Status> {
    let ext = mime
        .ext()
        .ok_or_else(|| Status::invalid_argument(format!("unknown mime for pic {}", pic_id)))?;
    Ok(pic_base_dir(pix_path, pic_id).join(format!("{}.{}", pic_id, ext)))
}

/// Where a derived file (thumbnail) of a pic lives under `pix_path`.
pub fn pic_file_derived_path(
    pix_path: &Path,
    pic_id: i64,
    index: i64,
    mime: Mime,
) -> Result<PathBuf, Status> {
    let ext = mime.ext().ok_or_else(|| {
        Status::invalid_argument(format!("unknown mime for pic {} thumbnail {}", pic_id, index))
    })?;
    Ok(pic_base_dir(pix_path, pic_id).join(format!("{}d{}.{}", pic_id, index, ext)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: i64,
    pub name: String,
    pub usage_count: i64,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
}

/// Tag names are unique without regard to case.
pub fn tag_unique_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicTag {
    pub pic_id: i64,
    pub tag_id: i64,
    pub name: String,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicComment {
    pub pic_id: i64,
    pub comment_id: i64,
    pub comment_parent_id: i64,
    pub text: String,
    pub user_id: i64,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
    /// Opaque extension data keyed by extension name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ext: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vote {
    #[default]
    Unknown,
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicVote {
    pub pic_id: i64,
    pub user_id: i64,
    /// Distinguishes votes by anonymous users on the same pic.
    pub index: i64,
    pub vote: Vote,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PicIdentType {
    Unknown,
    Sha256,
    Sha1,
    Md5,
    Dct0,
}

impl PicIdentType {
    pub fn as_i64(self) -> i64 {
        match self {
            PicIdentType::Unknown => 0,
            PicIdentType::Sha256 => 1,
            PicIdentType::Sha1 => 2,
            PicIdentType::Md5 => 3,
            PicIdentType::Dct0 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PicIdent {
    pub pic_id: i64,
    #[serde(rename = "type")]
    pub ident_type: PicIdentType,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    /// Password hash in PHC string form.
    pub secret: String,
    pub ident: String,
    pub created_ts: DateTime<Utc>,
    pub modified_ts: DateTime<Utc>,
    #[serde(default)]
    pub last_seen_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capability: CapSet,
}

/// Idents are unique without regard to case.
pub fn user_unique_ident(ident: &str) -> String {
    ident.to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserEventKind {
    OutgoingPicComment { pic_id: i64, comment_id: i64 },
    IncomingPicComment { pic_id: i64, comment_id: i64 },
    UpsertPic { pic_id: i64 },
}

impl UserEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            UserEventKind::OutgoingPicComment { .. } => "outgoing_pic_comment",
            UserEventKind::IncomingPicComment { .. } => "incoming_pic_comment",
            UserEventKind::UpsertPic { .. } => "upsert_pic",
        }
    }

    pub fn pic_id(&self) -> i64 {
        match *self {
            UserEventKind::OutgoingPicComment { pic_id, .. }
            | UserEventKind::IncomingPicComment { pic_id, .. }
            | UserEventKind::UpsertPic { pic_id } => pic_id,
        }
    }

    pub fn comment_id(&self) -> Option<i64> {
        match *self {
            UserEventKind::OutgoingPicComment { comment_id, .. }
            | UserEventKind::IncomingPicComment { comment_id, .. } => Some(comment_id),
            UserEventKind::UpsertPic { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: i64,
    pub created_ts: DateTime<Utc>,
    /// Disambiguates events for the same user at the same instant.
    pub index: i64,
    pub modified_ts: DateTime<Utc>,
    pub evt: UserEventKind,
}
