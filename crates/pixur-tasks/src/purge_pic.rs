use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pixur_db::job::{key_for_pic_comment, key_for_pic_ident, key_for_pic_tag, key_for_pic_vote};
use pixur_db::models::{User, pic_file_derived_path, pic_file_path};
use pixur_db::tables::{
    PicCommentsPrimary, PicIdentsPrimary, PicTagsPrimary, PicVotesPrimary, PicsPrimary,
    TagsPrimary,
};
use pixur_db::{Db, Job, Lock, Opts};
use pixur_types::status::replace_or_suppress;
use pixur_types::{Capability, Context, Status};
use tracing::{info, warn};

use crate::auth::{authed_job, get_configuration, validate_capability};
use crate::runner::Task;

/// Removes one file from disk.
pub type RemoveFn = Box<dyn Fn(&Path) -> std::io::Result<()> + Send + Sync>;

/// Erases a pic and everything hanging off it, then its files.
///
/// Rows go in one transaction. Files are only touched after it commits, so a
/// failed purge never leaves rows pointing at missing data.
pub struct PurgePicTask {
    // deps
    pub db: Arc<dyn Db>,
    pub now: fn() -> DateTime<Utc>,
    pub pix_path: PathBuf,
    pub remove: RemoveFn,

    // input
    pub pic_id: i64,
}

impl Task for PurgePicTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(ctx, &mut j, subject.as_ref());
        j.revert(res)
    }
}

impl PurgePicTask {
    fn run_job(
        &mut self,
        ctx: &Context,
        j: &mut Job<'_>,
        subject: Option<&User>,
    ) -> Result<(), Status> {
        let conf = get_configuration(ctx);
        validate_capability(subject, &conf, &[Capability::PicPurge])?;

        let pics = j.find_pics(&Opts {
            prefix: Some(
                PicsPrimary {
                    pic_id: Some(self.pic_id),
                }
                .into(),
            ),
            lock: Lock::Write,
            limit: 1,
            ..Default::default()
        })?;
        let Some(pic) = pics.into_iter().next() else {
            return Err(Status::not_found("can't find pic"));
        };

        let idents = j.find_pic_idents(&Opts {
            prefix: Some(
                PicIdentsPrimary {
                    pic_id: Some(pic.pic_id),
                    ident_type: None,
                    value: None,
                }
                .into(),
            ),
            lock: Lock::Write,
            ..Default::default()
        })?;
        for pi in &idents {
            j.delete_pic_ident(key_for_pic_ident(pi))
                .map_err(|sts| sts.wrap("can't delete pic ident"))?;
        }

        let now = (self.now)();
        let pic_tags = j.find_pic_tags(&Opts {
            prefix: Some(
                PicTagsPrimary {
                    pic_id: Some(pic.pic_id),
                    tag_id: None,
                }
                .into(),
            ),
            lock: Lock::Write,
            ..Default::default()
        })?;
        for pt in &pic_tags {
            let tags = j.find_tags(&Opts {
                prefix: Some(
                    TagsPrimary {
                        tag_id: Some(pt.tag_id),
                    }
                    .into(),
                ),
                lock: Lock::Write,
                limit: 1,
                ..Default::default()
            })?;
            let Some(mut tag) = tags.into_iter().next() else {
                return Err(Status::internal(format!("missing tag {}", pt.tag_id)));
            };
            if tag.usage_count <= 1 {
                j.delete_tag(TagsPrimary {
                    tag_id: Some(tag.tag_id),
                })
                .map_err(|sts| sts.wrap("can't delete tag"))?;
            } else {
                tag.usage_count -= 1;
                tag.set_modified_time(now);
                j.update_tag(&tag).map_err(|sts| sts.wrap("can't update tag"))?;
            }
            j.delete_pic_tag(key_for_pic_tag(pt))
                .map_err(|sts| sts.wrap("can't delete pic tag"))?;
        }

        let comments = j.find_pic_comments(&Opts {
            prefix: Some(
                PicCommentsPrimary {
                    pic_id: Some(pic.pic_id),
                    comment_id: None,
                }
                .into(),
            ),
            lock: Lock::Write,
            ..Default::default()
        })?;
        for pc in &comments {
            j.delete_pic_comment(key_for_pic_comment(pc))
                .map_err(|sts| sts.wrap("can't delete pic comment"))?;
        }

        let votes = j.find_pic_votes(&Opts {
            prefix: Some(
                PicVotesPrimary {
                    pic_id: Some(pic.pic_id),
                    user_id: None,
                    index: None,
                }
                .into(),
            ),
            lock: Lock::Write,
            ..Default::default()
        })?;
        for pv in &votes {
            j.delete_pic_vote(key_for_pic_vote(pv))
                .map_err(|sts| sts.wrap("can't delete pic vote"))?;
        }

        j.delete_pic(PicsPrimary {
            pic_id: Some(pic.pic_id),
        })
        .map_err(|sts| sts.wrap("can't delete pic"))?;

        j.commit()?;
        info!(pic_id = pic.pic_id, "purged pic rows");

        // The rows are gone; every file is attempted even if one fails.
        let mut paths = vec![pic_file_path(&self.pix_path, pic.pic_id, pic.mime)];
        for th in &pic.thumbnail {
            paths.push(pic_file_derived_path(
                &self.pix_path,
                pic.pic_id,
                th.index,
                th.mime,
            ));
        }
        let mut failure = None;
        for path in paths {
            let res = path
                .map_err(|sts| Status::data_loss("unable to delete pic data").with_cause(sts))
                .and_then(|p| {
                    (self.remove)(&p).map_err(|e| {
                        warn!(path = %p.display(), "can't remove pic file: {}", e);
                        Status::data_loss("unable to delete pic data").with_cause(e)
                    })
                });
            if let Err(sts) = res {
                replace_or_suppress(&mut failure, sts);
            }
        }
        match failure {
            Some(sts) => Err(sts),
            None => Ok(()),
        }
    }
}
