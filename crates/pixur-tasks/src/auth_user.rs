use std::sync::Arc;

use chrono::{DateTime, Utc};
use pixur_db::models::{User, user_unique_ident};
use pixur_db::tables::UsersIdent;
use pixur_db::{Db, Job, Lock, Opts};
use pixur_types::{Context, Status};

use crate::runner::Task;

/// Checks a plaintext secret against a stored hash.
pub type VerifyPasswordFn = fn(secret: &str, hash: &str) -> bool;

/// Exchanges an ident and secret for the matching user, recording when it
/// was last seen.
pub struct AuthUserTask {
    // deps
    pub db: Arc<dyn Db>,
    pub now: fn() -> DateTime<Utc>,
    pub verify_password: VerifyPasswordFn,

    // input
    pub ident: String,
    pub secret: String,

    // output
    pub user: Option<User>,
}

impl Task for AuthUserTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let mut j = Job::new(db.as_ref(), ctx)?;
        let res = self.run_job(&mut j);
        j.revert(res)
    }

    fn reset(&mut self) {
        self.user = None;
    }
}

impl AuthUserTask {
    fn run_job(&mut self, j: &mut Job<'_>) -> Result<(), Status> {
        if self.ident.is_empty() || self.secret.is_empty() {
            return Err(Status::invalid_argument("missing ident or secret"));
        }
        let users = j.find_users(&Opts {
            prefix: Some(
                UsersIdent {
                    ident: Some(user_unique_ident(&self.ident)),
                }
                .into(),
            ),
            lock: Lock::Write,
            limit: 1,
            ..Default::default()
        })?;
        let Some(mut user) = users.into_iter().next() else {
            return Err(Status::not_found("can't lookup user"));
        };
        if !(self.verify_password)(&self.secret, &user.secret) {
            return Err(Status::unauthenticated("wrong secret"));
        }

        // Not a user visible change, so the version stays put.
        user.last_seen_ts = Some((self.now)());
        j.update_user(&user)
            .map_err(|sts| sts.wrap("can't update user"))?;
        j.commit()?;

        self.user = Some(user);
        Ok(())
    }
}
