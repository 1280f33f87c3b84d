use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use pixur_db::models::User;
use pixur_db::tables::UsersPrimary;
use pixur_db::{Db, Job, Lock, Opts};
use pixur_types::caps::verify_capability_subset;
use pixur_types::{CapSet, Capability, Context, Status};
use tracing::debug;

use crate::auth::authed_job;
use crate::runner::Task;

/// Changes the capabilities of a user, guarded by the version the caller last
/// saw.
pub struct UpdateUserTask {
    // deps
    pub db: Arc<dyn Db>,
    pub now: fn() -> DateTime<Utc>,

    // input
    /// Zero means the caller.
    pub object_user_id: i64,
    pub version: i64,
    pub set_capability: Vec<Capability>,
    pub clear_capability: Vec<Capability>,

    // output
    pub object_user: Option<User>,
}

impl Task for UpdateUserTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(&mut j, subject);
        j.revert(res)
    }

    fn reset(&mut self) {
        self.object_user = None;
    }
}

impl UpdateUserTask {
    fn run_job(&mut self, j: &mut Job<'_>, subject: Option<User>) -> Result<(), Status> {
        let Some(subject) = subject else {
            return Err(Status::unauthenticated("missing user"));
        };

        let capchange = self.set_capability.len() + self.clear_capability.len();
        if capchange > 0 {
            let mut both = BTreeSet::new();
            for &c in self.set_capability.iter().chain(&self.clear_capability) {
                if !c.is_known() {
                    return Err(Status::invalid_argument(format!("unknown cap {}", c)));
                }
                both.insert(c);
            }
            if both.len() != capchange {
                return Err(Status::invalid_argument("cap change overlap"));
            }
        }

        let object_user_id = if self.object_user_id == 0 {
            subject.user_id
        } else {
            self.object_user_id
        };
        // Checked before the row lock below.
        if capchange > 0 || object_user_id != subject.user_id {
            verify_capability_subset(&subject.capability, &[Capability::UserUpdateCapability])?;
        }
        let users = j.find_users(&Opts {
            prefix: Some(
                UsersPrimary {
                    user_id: Some(object_user_id),
                }
                .into(),
            ),
            lock: Lock::Write,
            limit: 1,
            ..Default::default()
        })?;
        let Some(mut object_user) = users.into_iter().next() else {
            return Err(Status::not_found("can't lookup user"));
        };

        if object_user.version() != self.version {
            return Err(Status::aborted("version mismatch"));
        }

        let old = object_user.capability.clone();
        let mut caps: CapSet = old.iter().chain(self.set_capability.iter().copied()).collect();
        for &c in &self.clear_capability {
            if !caps.remove(c) {
                return Err(Status::invalid_argument(format!(
                    "cap change leftover: {} not held",
                    c
                )));
            }
        }

        if caps == old {
            debug!(user_id = object_user.user_id, "no capability change");
            j.rollback()?;
        } else {
            object_user.capability = caps;
            let mut now = (self.now)();
            // Versions must strictly increase even if the clock does not.
            if now <= object_user.modified_ts {
                now = object_user.modified_ts + TimeDelta::nanoseconds(1);
            }
            object_user.set_modified_time(now);
            j.update_user(&object_user)
                .map_err(|sts| sts.wrap("can't update user"))?;
            j.commit()?;
        }

        self.object_user = Some(object_user);
        Ok(())
    }
}
