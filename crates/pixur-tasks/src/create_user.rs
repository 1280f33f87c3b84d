use std::sync::Arc;

use chrono::{DateTime, Utc};
use pixur_db::models::{User, user_unique_ident};
use pixur_db::tables::UsersIdent;
use pixur_db::{Db, Job, Lock, Opts};
use pixur_types::config::bounds;
use pixur_types::{CapSet, Capability, Context, Status};
use tracing::info;

use crate::auth::{authed_job, get_configuration, validate_capability};
use crate::runner::Task;
use crate::text::validate_and_normalize;

/// Hashes a plaintext secret for storage.
pub type HashPasswordFn = fn(&str) -> Result<String, Status>;

pub struct CreateUserTask {
    // deps
    pub db: Arc<dyn Db>,
    pub now: fn() -> DateTime<Utc>,
    pub hash_password: HashPasswordFn,

    // input
    pub ident: String,
    pub secret: String,
    /// Replaces the configured new user capabilities. Needs
    /// USER_UPDATE_CAPABILITY.
    pub capability: Option<Vec<Capability>>,

    // output
    pub created_user: Option<User>,
}

impl Task for CreateUserTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(ctx, &mut j, subject.as_ref());
        j.revert(res)
    }

    fn reset(&mut self) {
        self.created_user = None;
    }
}

impl CreateUserTask {
    fn run_job(
        &mut self,
        ctx: &Context,
        j: &mut Job<'_>,
        subject: Option<&User>,
    ) -> Result<(), Status> {
        let now = (self.now)();
        let conf = get_configuration(ctx);

        let (min_ident, max_ident) = bounds(conf.min_ident_length, conf.max_ident_length);
        let ident = validate_and_normalize(&self.ident, "ident", min_ident, max_ident, false)?;
        if self.secret.is_empty() {
            return Err(Status::invalid_argument("missing secret"));
        }

        validate_capability(subject, &conf, &[Capability::UserCreate])?;
        let capability = match &self.capability {
            Some(caps) => {
                validate_capability(subject, &conf, &[Capability::UserUpdateCapability])?;
                if let Some(c) = caps.iter().find(|c| !c.is_known()) {
                    return Err(Status::invalid_argument(format!("unknown cap {}", c)));
                }
                caps.iter().copied().collect::<CapSet>()
            }
            None => conf.new_user_capability.clone(),
        };

        let existing = j.find_users(&Opts {
            prefix: Some(
                UsersIdent {
                    ident: Some(user_unique_ident(&ident)),
                }
                .into(),
            ),
            lock: Lock::Write,
            limit: 1,
            ..Default::default()
        })?;
        if !existing.is_empty() {
            return Err(Status::already_exists("ident already used"));
        }

        let user_id = j.alloc_id().map_err(|sts| sts.wrap("can't allocate id"))?;
        let secret = (self.hash_password)(&self.secret)?;

        let user = User {
            user_id,
            secret,
            ident,
            created_ts: now,
            modified_ts: now,
            last_seen_ts: None,
            capability,
        };

        j.insert_user(&user).map_err(|sts| sts.wrap("can't create user"))?;
        j.commit()?;

        info!(user_id, "created user");
        self.created_user = Some(user);
        Ok(())
    }
}
