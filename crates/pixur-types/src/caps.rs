use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::Status;

/// An atomic permission grant attached to a user or to a configuration default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    Unknown,
    PicCreate,
    PicRead,
    PicIndex,
    PicUpdateViewCounter,
    PicTagCreate,
    PicCommentCreate,
    PicVoteCreate,
    PicSoftDelete,
    PicHardDelete,
    PicPurge,
    PicCommentExtensionCreate,
    PicCommentExtensionRead,
    UserCreate,
    UserReadSelf,
    UserReadAll,
    UserReadPublic,
    UserReadPicComment,
    UserReadPicVote,
    UserUpdateCapability,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Unknown => "UNKNOWN",
            Capability::PicCreate => "PIC_CREATE",
            Capability::PicRead => "PIC_READ",
            Capability::PicIndex => "PIC_INDEX",
            Capability::PicUpdateViewCounter => "PIC_UPDATE_VIEW_COUNTER",
            Capability::PicTagCreate => "PIC_TAG_CREATE",
            Capability::PicCommentCreate => "PIC_COMMENT_CREATE",
            Capability::PicVoteCreate => "PIC_VOTE_CREATE",
            Capability::PicSoftDelete => "PIC_SOFT_DELETE",
            Capability::PicHardDelete => "PIC_HARD_DELETE",
            Capability::PicPurge => "PIC_PURGE",
            Capability::PicCommentExtensionCreate => "PIC_COMMENT_EXTENSION_CREATE",
            Capability::PicCommentExtensionRead => "PIC_COMMENT_EXTENSION_READ",
            Capability::UserCreate => "USER_CREATE",
            Capability::UserReadSelf => "USER_READ_SELF",
            Capability::UserReadAll => "USER_READ_ALL",
            Capability::UserReadPublic => "USER_READ_PUBLIC",
            Capability::UserReadPicComment => "USER_READ_PIC_COMMENT",
            Capability::UserReadPicVote => "USER_READ_PIC_VOTE",
            Capability::UserUpdateCapability => "USER_UPDATE_CAPABILITY",
        }
    }

    /// `Unknown` is a placeholder, never a grantable capability.
    pub fn is_known(self) -> bool {
        self != Capability::Unknown
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unordered set of capabilities, kept sorted for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapSet(BTreeSet<Capability>);

impl CapSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(caps: &[Capability]) -> Self {
        Self(caps.iter().copied().collect())
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn insert(&mut self, cap: Capability) -> bool {
        self.0.insert(cap)
    }

    pub fn remove(&mut self, cap: Capability) -> bool {
        self.0.remove(&cap)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<Capability> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<Capability> for CapSet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Fails with permission-denied naming the first capability in `want` that
/// `have` does not contain.
pub fn verify_capability_subset(have: &CapSet, want: &[Capability]) -> Result<(), Status> {
    for &cap in want {
        if !have.has(cap) {
            return Err(Status::permission_denied(format!("missing cap {}", cap)));
        }
    }
    Ok(())
}
