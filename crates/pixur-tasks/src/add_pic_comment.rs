use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pixur_db::models::{ANONYMOUS_USER_ID, PicComment, User, UserEvent, UserEventKind, ts_nanos};
use pixur_db::tables::{PicCommentsPrimary, PicsPrimary, UserEventsPrimary};
use pixur_db::{Db, Job, Lock, Opts};
use pixur_types::config::bounds;
use pixur_types::{Capability, Context, Status};

use crate::auth::{authed_job, filter_pic_comment, get_configuration, validate_capability};
use crate::runner::Task;
use crate::text::validate_and_normalize;

pub struct AddPicCommentTask {
    // deps
    pub db: Arc<dyn Db>,
    pub now: fn() -> DateTime<Utc>,

    // input
    pub pic_id: i64,
    /// Zero for a top level comment.
    pub comment_parent_id: i64,
    pub text: String,
    /// Extra data attached to the comment. Needs PIC_COMMENT_EXTENSION_CREATE.
    pub ext: BTreeMap<String, serde_json::Value>,

    // output
    pub unfiltered_pic_comment: Option<PicComment>,
    pub pic_comment: Option<PicComment>,
}

impl Task for AddPicCommentTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(ctx, &mut j, subject.as_ref());
        j.revert(res)
    }

    fn reset(&mut self) {
        self.unfiltered_pic_comment = None;
        self.pic_comment = None;
    }
}

impl AddPicCommentTask {
    fn run_job(
        &mut self,
        ctx: &Context,
        j: &mut Job<'_>,
        subject: Option<&User>,
    ) -> Result<(), Status> {
        let now = (self.now)();
        let conf = get_configuration(ctx);

        let (min_len, max_len) = bounds(conf.min_comment_length, conf.max_comment_length);
        let text = validate_and_normalize(&self.text, "comment", min_len, max_len, true)?;

        validate_capability(subject, &conf, &[Capability::PicCommentCreate])?;
        if !self.ext.is_empty() {
            validate_capability(subject, &conf, &[Capability::PicCommentExtensionCreate])?;
        }
        let user_id = subject.map_or(ANONYMOUS_USER_ID, |u| u.user_id);

        let pics = j.find_pics(&Opts {
            prefix: Some(
                PicsPrimary {
                    pic_id: Some(self.pic_id),
                }
                .into(),
            ),
            limit: 1,
            ..Default::default()
        })?;
        let Some(pic) = pics.into_iter().next() else {
            return Err(Status::not_found("can't find pic"));
        };
        if pic.hard_deleted() {
            return Err(Status::invalid_argument("can't comment on deleted pic"));
        }

        let mut comment_parent = None;
        if self.comment_parent_id != 0 {
            let comments = j.find_pic_comments(&Opts {
                prefix: Some(
                    PicCommentsPrimary {
                        pic_id: Some(self.pic_id),
                        comment_id: Some(self.comment_parent_id),
                    }
                    .into(),
                ),
                ..Default::default()
            })?;
            let Some(parent) = comments.into_iter().next() else {
                return Err(Status::not_found("can't find comment"));
            };
            if conf.enable_pic_comment_self_reply == Some(false)
                && user_id != ANONYMOUS_USER_ID
                && user_id == parent.user_id
            {
                return Err(Status::invalid_argument("can't self reply"));
            }
            comment_parent = Some(parent);
        }
        if conf.enable_pic_comment_sibling_reply == Some(false) && user_id != ANONYMOUS_USER_ID {
            let siblings = j.find_pic_comments(&Opts {
                prefix: Some(
                    PicCommentsPrimary {
                        pic_id: Some(self.pic_id),
                        comment_id: None,
                    }
                    .into(),
                ),
                ..Default::default()
            })?;
            if siblings
                .iter()
                .any(|c| c.comment_parent_id == self.comment_parent_id && c.user_id == user_id)
            {
                return Err(Status::invalid_argument("can't double reply"));
            }
        }

        let comment_id = j.alloc_id().map_err(|sts| sts.wrap("can't allocate id"))?;
        let pc = PicComment {
            pic_id: pic.pic_id,
            comment_id,
            comment_parent_id: self.comment_parent_id,
            text,
            user_id,
            created_ts: now,
            modified_ts: now,
            ext: std::mem::take(&mut self.ext),
        };
        j.insert_pic_comment(&pc)
            .map_err(|sts| sts.wrap("can't insert comment"))?;

        // One event per distinct user: the author, then whoever is being
        // replied to, or the uploaders for a top level comment.
        let created_ts = ts_nanos(pc.created_ts);
        let mut notified = BTreeSet::new();
        let mut events = Vec::new();
        let mut push_event = |j: &mut Job<'_>, uid: i64, evt: UserEventKind| {
            if uid == ANONYMOUS_USER_ID || !notified.insert(uid) {
                return Ok::<(), Status>(());
            }
            let index = next_user_event_index(j, uid, created_ts)?;
            events.push(UserEvent {
                user_id: uid,
                created_ts: pc.created_ts,
                index,
                modified_ts: pc.modified_ts,
                evt,
            });
            Ok(())
        };

        let outgoing = UserEventKind::OutgoingPicComment {
            pic_id: pic.pic_id,
            comment_id,
        };
        let incoming = UserEventKind::IncomingPicComment {
            pic_id: pic.pic_id,
            comment_id,
        };
        push_event(j, user_id, outgoing)?;
        match &comment_parent {
            Some(parent) => push_event(j, parent.user_id, incoming)?,
            None => {
                for source in &pic.source {
                    push_event(j, source.user_id, incoming)?;
                }
            }
        }

        for ue in &events {
            j.insert_user_event(ue)
                .map_err(|sts| sts.wrap("can't create user event"))?;
        }

        j.commit()?;

        self.pic_comment = Some(filter_pic_comment(&pc, subject, &conf));
        self.unfiltered_pic_comment = Some(pc);
        Ok(())
    }
}

/// Picks the next free event index for `user_id` at `created_ts`.
///
/// The scan takes a write lock so that concurrent transactions adding events
/// for the same user and instant serialize instead of picking the same index.
pub fn next_user_event_index(j: &mut Job<'_>, user_id: i64, created_ts: i64) -> Result<i64, Status> {
    let events = j
        .find_user_events(&Opts {
            prefix: Some(
                UserEventsPrimary {
                    user_id: Some(user_id),
                    created_ts: Some(created_ts),
                    index: None,
                }
                .into(),
            ),
            lock: Lock::Write,
            ..Default::default()
        })
        .map_err(|sts| sts.wrap("can't lookup user events"))?;
    let biggest = events.iter().map(|ue| ue.index).max().unwrap_or(-1);
    biggest
        .checked_add(1)
        .ok_or_else(|| Status::internal("overflow of user event index"))
}
