//! Resolving who the caller is and what they may do.

use std::sync::Arc;

use pixur_db::models::{ANONYMOUS_USER_ID, PicComment, User};
use pixur_db::tables::UsersPrimary;
use pixur_db::{Db, Job, Opts};
use pixur_types::caps::verify_capability_subset;
use pixur_types::{CapSet, Capability, Configuration, Context, Status};

/// Opens a job and loads the authenticated subject, if any, without locking.
pub fn authed_job<'a>(ctx: &Context, db: &'a dyn Db) -> Result<(Job<'a>, Option<User>), Status> {
    let mut j = Job::new(db, ctx)?;
    let Some(token) = ctx.subject() else {
        return Ok((j, None));
    };
    let users = j.find_users(&Opts {
        prefix: Some(
            UsersPrimary {
                user_id: Some(token.user_id),
            }
            .into(),
        ),
        limit: 1,
        ..Default::default()
    })?;
    match users.into_iter().next() {
        Some(u) => Ok((j, Some(u))),
        None => Err(Status::unauthenticated("can't lookup user")),
    }
}

/// The site configuration for this request, or the defaults if none was
/// attached.
pub fn get_configuration(ctx: &Context) -> Arc<Configuration> {
    ctx.configuration()
        .cloned()
        .unwrap_or_else(|| Arc::new(Configuration::default()))
}

/// Checks that the caller holds every capability in `caps`.
///
/// Anonymous callers are judged against the configured anonymous set; a miss
/// is reported as Unauthenticated so the caller knows logging in may help.
pub fn validate_capability(
    user: Option<&User>,
    conf: &Configuration,
    caps: &[Capability],
) -> Result<(), Status> {
    match user {
        Some(u) => verify_capability_subset(&u.capability, caps),
        None => verify_capability_subset(&conf.anonymous_capability, caps)
            .map_err(|sts| Status::unauthenticated(sts.message().to_string()).with_cause(sts)),
    }
}

/// The subject and capability set used to decide what a caller may see.
#[derive(Debug, Clone)]
pub struct UserCred {
    pub subject_user_id: i64,
    pub caps: CapSet,
}

impl UserCred {
    pub fn of(user: Option<&User>, conf: &Configuration) -> Self {
        match user {
            Some(u) => Self {
                subject_user_id: u.user_id,
                caps: u.capability.clone(),
            },
            None => Self {
                subject_user_id: ANONYMOUS_USER_ID,
                caps: conf.anonymous_capability.clone(),
            },
        }
    }

    /// A copy of `pc` with the author and extension data hidden unless the
    /// caller may read them.
    pub fn filter_pic_comment(&self, pc: &PicComment) -> PicComment {
        let mut dst = pc.clone();
        if !self.caps.has(Capability::PicCommentExtensionRead) {
            dst.ext.clear();
        }
        let author_visible = self.caps.has(Capability::UserReadAll)
            || (self.caps.has(Capability::UserReadPublic)
                && self.caps.has(Capability::UserReadPicComment))
            || (self.subject_user_id == dst.user_id && self.caps.has(Capability::UserReadSelf));
        if !author_visible {
            dst.user_id = ANONYMOUS_USER_ID;
        }
        dst
    }
}

pub fn filter_pic_comment(pc: &PicComment, user: Option<&User>, conf: &Configuration) -> PicComment {
    UserCred::of(user, conf).filter_pic_comment(pc)
}
