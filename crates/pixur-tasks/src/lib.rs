//! Business operations. Each task runs inside one [`pixur_db::Job`], checks
//! the caller's capabilities before touching any row it will change, and
//! reports failures as a [`pixur_types::Status`].

pub mod auth;
pub mod runner;
pub mod text;

mod add_pic_comment;
mod auth_user;
mod create_user;
mod find_user_events;
mod increment_view_count;
mod lookup_user;
mod purge_pic;
mod update_user;

pub use add_pic_comment::{AddPicCommentTask, next_user_event_index};
pub use auth_user::{AuthUserTask, VerifyPasswordFn};
pub use create_user::{CreateUserTask, HashPasswordFn};
pub use find_user_events::{FindUserEventsTask, USER_EVENT_PAGE_SIZE, UserEventKey};
pub use increment_view_count::IncrementViewCountTask;
pub use lookup_user::LookupUserTask;
pub use purge_pic::{PurgePicTask, RemoveFn};
pub use runner::{Task, TaskRunner};
pub use update_user::UpdateUserTask;
