use std::sync::Arc;

use chrono::{DateTime, Utc};
use pixur_db::models::User;
use pixur_db::tables::PicsPrimary;
use pixur_db::{Db, Job, Lock, Opts};
use pixur_types::{Capability, Context, Status};

use crate::auth::{authed_job, get_configuration, validate_capability};
use crate::runner::Task;

pub struct IncrementViewCountTask {
    // deps
    pub db: Arc<dyn Db>,
    pub now: fn() -> DateTime<Utc>,

    // input
    pub pic_id: i64,

    // output
    pub view_count: i64,
}

impl Task for IncrementViewCountTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(ctx, &mut j, subject.as_ref());
        j.revert(res)
    }

    fn reset(&mut self) {
        self.view_count = 0;
    }
}

impl IncrementViewCountTask {
    fn run_job(
        &mut self,
        ctx: &Context,
        j: &mut Job<'_>,
        subject: Option<&User>,
    ) -> Result<(), Status> {
        let conf = get_configuration(ctx);
        validate_capability(subject, &conf, &[Capability::PicUpdateViewCounter])?;

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
        let Some(mut pic) = pics.into_iter().next() else {
            return Err(Status::not_found("can't find pic"));
        };
        if pic.hard_deleted() {
            return Err(Status::invalid_argument("can't update deleted pic"));
        }

        pic.view_count = pic
            .view_count
            .checked_add(1)
            .ok_or_else(|| Status::internal("overflow of view count"))?;
        pic.set_modified_time((self.now)());
        j.update_pic(&pic).map_err(|sts| sts.wrap("can't update pic"))?;
        j.commit()?;

        self.view_count = pic.view_count;
        Ok(())
    }
}
