use std::sync::Arc;

use pixur_db::models::{User, UserEvent, ts_nanos};
use pixur_db::tables::UserEventsPrimary;
use pixur_db::{Db, Idx, Job, Opts};
use pixur_types::{Capability, Context, Status};

use crate::auth::{authed_job, get_configuration, validate_capability};
use crate::runner::Task;

pub const USER_EVENT_PAGE_SIZE: usize = 10;

/// Position of one event in a user's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UserEventKey {
    pub user_id: i64,
    pub created_ts: i64,
    pub index: i64,
}

impl UserEventKey {
    pub fn of(ue: &UserEvent) -> Self {
        Self {
            user_id: ue.user_id,
            created_ts: ts_nanos(ue.created_ts),
            index: ue.index,
        }
    }

    fn idx(self) -> UserEventsPrimary {
        UserEventsPrimary {
            user_id: Some(self.user_id),
            created_ts: Some(self.created_ts),
            index: Some(self.index),
        }
    }

    /// Smallest bound sorting after this key, or `None` past the last
    /// possible event of the user.
    fn successor(self) -> Option<UserEventsPrimary> {
        if let Some(index) = self.index.checked_add(1) {
            return Some(UserEventsPrimary {
                index: Some(index),
                ..self.idx()
            });
        }
        self.created_ts
            .checked_add(1)
            .map(|created_ts| UserEventsPrimary {
                user_id: Some(self.user_id),
                created_ts: Some(created_ts),
                index: None,
            })
    }
}

fn user_bound(user_id: i64) -> UserEventsPrimary {
    UserEventsPrimary {
        user_id: Some(user_id),
        ..Default::default()
    }
}

/// Bound just past every event of `user_id`.
fn after_user(user_id: i64) -> Option<Idx> {
    user_id.checked_add(1).map(|u| user_bound(u).into())
}

/// Pages through a user's event stream, newest first unless `ascending`.
///
/// `next` continues in the same direction; `prev` is the nearest event on the
/// other side of `start`, to be read with the direction flipped.
pub struct FindUserEventsTask {
    // deps
    pub db: Arc<dyn Db>,

    // input
    /// Zero means the caller.
    pub object_user_id: i64,
    /// Inclusive position to resume from.
    pub start: Option<UserEventKey>,
    pub ascending: bool,

    // output
    pub user_events: Vec<UserEvent>,
    pub next: Option<UserEventKey>,
    pub prev: Option<UserEventKey>,
}

impl Task for FindUserEventsTask {
    fn run(&mut self, ctx: &Context) -> Result<(), Status> {
        let db = Arc::clone(&self.db);
        let (mut j, subject) = authed_job(ctx, db.as_ref())?;
        let res = self.run_job(ctx, &mut j, subject.as_ref());
        j.revert(res)
    }

    fn reset(&mut self) {
        self.user_events.clear();
        self.next = None;
        self.prev = None;
    }
}

impl FindUserEventsTask {
    fn run_job(
        &mut self,
        ctx: &Context,
        j: &mut Job<'_>,
        subject: Option<&User>,
    ) -> Result<(), Status> {
        let conf = get_configuration(ctx);
        let subject_id = subject.map(|s| s.user_id);
        let object_user_id = match (self.object_user_id, subject_id) {
            (0, Some(id)) => id,
            (0, None) => return Err(Status::unauthenticated("missing user")),
            (id, _) => id,
        };
        let needed = if Some(object_user_id) == subject_id {
            Capability::UserReadSelf
        } else {
            Capability::UserReadAll
        };
        validate_capability(subject, &conf, &[needed])?;

        if self.start.is_some_and(|k| k.user_id != object_user_id) {
            return Err(Status::invalid_argument("mismatched user event key"));
        }

        let mut events = find_page(j, object_user_id, self.start, self.ascending)?;
        let next = if events.len() > USER_EVENT_PAGE_SIZE {
            events.pop().map(|ue| UserEventKey::of(&ue))
        } else {
            None
        };
        let prev = match self.start {
            Some(start) => find_prev(j, start, self.ascending)?,
            None => None,
        };
        self.user_events = events;
        self.next = next;
        self.prev = prev;
        Ok(())
    }
}

fn find_page(
    j: &mut Job<'_>,
    user_id: i64,
    start: Option<UserEventKey>,
    ascending: bool,
) -> Result<Vec<UserEvent>, Status> {
    let limit = USER_EVENT_PAGE_SIZE + 1;
    let opts = match (start, ascending) {
        (None, _) => Opts {
            prefix: Some(user_bound(user_id).into()),
            reverse: !ascending,
            limit,
            ..Default::default()
        },
        (Some(k), true) => Opts {
            start: Some(k.idx().into()),
            stop: after_user(user_id),
            limit,
            ..Default::default()
        },
        (Some(k), false) => Opts {
            start: Some(user_bound(user_id).into()),
            stop: match k.successor() {
                Some(succ) => Some(succ.into()),
                None => after_user(user_id),
            },
            reverse: true,
            limit,
            ..Default::default()
        },
    };
    j.find_user_events(&opts)
        .map_err(|sts| sts.wrap("can't find user events"))
}

fn find_prev(
    j: &mut Job<'_>,
    start: UserEventKey,
    ascending: bool,
) -> Result<Option<UserEventKey>, Status> {
    let opts = if ascending {
        Opts {
            start: Some(user_bound(start.user_id).into()),
            stop: Some(start.idx().into()),
            reverse: true,
            limit: 1,
            ..Default::default()
        }
    } else {
        let Some(succ) = start.successor() else {
            return Ok(None);
        };
        Opts {
            start: Some(succ.into()),
            stop: after_user(start.user_id),
            limit: 1,
            ..Default::default()
        }
    };
    let events = j
        .find_user_events(&opts)
        .map_err(|sts| sts.wrap("can't find user events"))?;
    Ok(events.first().map(UserEventKey::of))
}
