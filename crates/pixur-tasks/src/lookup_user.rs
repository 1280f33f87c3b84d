use std::sync::Arc;

use pixur_db::models::User;
use pixur_db::tables::UsersPrimary;
use pixur_db::{Db, Job, Opts};
use pixur_types::{Capability, Context, Status};

use crate::auth::{authed_job, get_configuration, validate_capability};
use crate::runner::Task;

/// Reads a user record.
///
/// Reading yourself needs USER_READ_SELF, anyone else USER_READ_ALL. With
/// `public_only` set, USER_READ_PUBLIC suffices and callers must strip the
/// result down to public fields.
pub struct LookupUserTask {
    // deps
    pub db: Arc<dyn Db>,

    // input
    /// Zero means the caller.
    pub object_user_id: i64,
    pub public_only: bool,

    // output
    pub user: Option<User>,
}

impl Task for LookupUserTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(ctx, &mut j, subject);
        j.revert(res)
    }

    fn reset(&mut self) {
        self.user = None;
    }
}

impl LookupUserTask {
    fn run_job(
        &mut self,
        ctx: &Context,
        j: &mut Job<'_>,
        subject: Option<User>,
    ) -> Result<(), Status> {
        let conf = get_configuration(ctx);
        let is_self = match &subject {
            Some(s) => self.object_user_id == 0 || self.object_user_id == s.user_id,
            None => self.object_user_id == 0,
        };

        let needed = if self.public_only {
            Capability::UserReadPublic
        } else if is_self {
            Capability::UserReadSelf
        } else {
            Capability::UserReadAll
        };
        validate_capability(subject.as_ref(), &conf, &[needed])?;

        if is_self {
            return match subject {
                Some(s) => {
                    self.user = Some(s);
                    Ok(())
                }
                None => Err(Status::unauthenticated("missing user")),
            };
        }

        let users = j.find_users(&Opts {
            prefix: Some(
                UsersPrimary {
                    user_id: Some(self.object_user_id),
                }
                .into(),
            ),
            limit: 1,
            ..Default::default()
        })?;
        match users.into_iter().next() {
            Some(u) => {
                self.user = Some(u);
                Ok(())
            }
            None => Err(Status::not_found("can't lookup user")),
        }
    }
}
