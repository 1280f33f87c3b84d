mod common;

use std::sync::Arc;

use chrono::TimeDelta;
use common::{Container, now};
use pixur_db::models::{User, UserEvent, UserEventKind};
use pixur_tasks::{FindUserEventsTask, Task, USER_EVENT_PAGE_SIZE, UserEventKey};
use pixur_types::{Capability, Code};

const EVENTS: i64 = 12;

/// Gives `user` one event per second, oldest first.
fn seed_events(c: &Container, user: &User) -> Vec<UserEventKey> {
    let base = now();
    let mut j = c.job();
    let mut keys = Vec::new();
    for i in 0..EVENTS {
        let ts = base + TimeDelta::seconds(i);
        let ue = UserEvent {
            user_id: user.user_id,
            created_ts: ts,
            index: 0,
            modified_ts: ts,
            evt: UserEventKind::UpsertPic { pic_id: i },
        };
        j.insert_user_event(&ue).unwrap();
        keys.push(UserEventKey::of(&ue));
    }
    j.commit().unwrap();
    keys
}

fn find_task(c: &Container, start: Option<UserEventKey>, ascending: bool) -> FindUserEventsTask {
    FindUserEventsTask {
        db: Arc::clone(&c.db),
        object_user_id: 0,
        start,
        ascending,
        user_events: vec![],
        next: None,
        prev: None,
    }
}

fn keys(task: &FindUserEventsTask) -> Vec<UserEventKey> {
    task.user_events.iter().map(UserEventKey::of).collect()
}

#[test]
fn pages_newest_first() {
    let c = Container::new();
    let user = c.create_user(&[Capability::UserReadSelf]);
    let all = seed_events(&c, &user);
    let newest_first: Vec<_> = all.iter().rev().copied().collect();

    let mut first = find_task(&c, None, false);
    first.run(&c.ctx_for(&user)).unwrap();
    assert_eq!(keys(&first), newest_first[..USER_EVENT_PAGE_SIZE]);
    assert_eq!(first.next, Some(newest_first[USER_EVENT_PAGE_SIZE]));
    assert_eq!(first.prev, None);

    let mut second = find_task(&c, first.next, false);
    second.run(&c.ctx_for(&user)).unwrap();
    assert_eq!(keys(&second), newest_first[USER_EVENT_PAGE_SIZE..]);
    assert_eq!(second.next, None);
    assert_eq!(second.prev, Some(newest_first[USER_EVENT_PAGE_SIZE - 1]));
}

#[test]
fn pages_oldest_first() {
    let c = Container::new();
    let user = c.create_user(&[Capability::UserReadSelf]);
    let all = seed_events(&c, &user);

    let mut first = find_task(&c, None, true);
    first.run(&c.ctx_for(&user)).unwrap();
    assert_eq!(keys(&first), all[..USER_EVENT_PAGE_SIZE]);
    assert_eq!(first.next, Some(all[USER_EVENT_PAGE_SIZE]));

    let mut second = find_task(&c, first.next, true);
    second.run(&c.ctx_for(&user)).unwrap();
    assert_eq!(keys(&second), all[USER_EVENT_PAGE_SIZE..]);
    assert_eq!(second.next, None);
    assert_eq!(second.prev, Some(all[USER_EVENT_PAGE_SIZE - 1]));
}

#[test]
fn other_users_events_stay_separate() {
    let c = Container::new();
    let user = c.create_user(&[Capability::UserReadSelf]);
    let neighbor = c.create_user(&[]);
    seed_events(&c, &neighbor);
    let own = seed_events(&c, &user);

    let mut task = find_task(&c, Some(own[0]), false);
    task.run(&c.ctx_for(&user)).unwrap();
    assert_eq!(keys(&task), vec![own[0]]);
    assert_eq!(task.next, None);
    assert_eq!(task.prev, Some(own[1]));
}

#[test]
fn reading_others_needs_read_all() {
    let c = Container::new();
    let user = c.create_user(&[Capability::UserReadSelf]);
    let admin = c.create_user(&[Capability::UserReadAll]);
    seed_events(&c, &user);

    let mut task = find_task(&c, None, false);
    task.object_user_id = user.user_id;
    task.run(&c.ctx_for(&admin)).unwrap();
    assert_eq!(task.user_events.len(), USER_EVENT_PAGE_SIZE);

    let stranger = c.create_user(&[Capability::UserReadSelf]);
    let sts = task.run(&c.ctx_for(&stranger)).unwrap_err();
    assert_eq!(sts.code(), Code::PermissionDenied);

    task.object_user_id = 0;
    let sts = task.run(&c.ctx()).unwrap_err();
    assert_eq!(sts.code(), Code::Unauthenticated);
}

#[test]
fn start_key_must_match_user() {
    let c = Container::new();
    let user = c.create_user(&[Capability::UserReadSelf]);
    let mut task = find_task(
        &c,
        Some(UserEventKey {
            user_id: user.user_id + 1,
            created_ts: 0,
            index: 0,
        }),
        false,
    );
    let sts = task.run(&c.ctx_for(&user)).unwrap_err();
    assert_eq!(sts.code(), Code::InvalidArgument);
}
