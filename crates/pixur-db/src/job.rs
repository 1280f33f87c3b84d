use std::sync::Arc;

use pixur_types::{Context, Status};
use tracing::{debug, warn};

use crate::adapter::DbAdapter;
use crate::builder::{self, DATA_COL, Idx, Opts};
use crate::models::{Pic, PicComment, PicIdent, PicTag, PicVote, Tag, User, UserEvent};
use crate::tables::{
    PicCommentsPrimary, PicIdentsPrimary, PicTagsPrimary, PicVotesPrimary, PicsPrimary, Table,
    TagsPrimary, UserEventsPrimary, UsersPrimary, col_names,
};
use crate::{Db, QuerierExecutorCommitter, Value, id};

/// One transaction, owned by a single task attempt.
///
/// Ends exactly once: either `commit` succeeds, or the transaction is rolled
/// back by `rollback`, `revert`, or drop.
pub struct Job<'a> {
    tx: Box<dyn QuerierExecutorCommitter + 'a>,
    adap: Arc<dyn DbAdapter>,
    done: bool,
    committed: bool,
}

impl<'a> Job<'a> {
    pub fn new(db: &'a dyn Db, ctx: &Context) -> Result<Self, Status> {
        let tx = db
            .begin(ctx)
            .map_err(|e| Status::from(e).wrap("can't create job"))?;
        Ok(Self {
            tx,
            adap: db.adapter(),
            done: false,
            committed: false,
        })
    }

    pub fn adapter(&self) -> &dyn DbAdapter {
        self.adap.as_ref()
    }

    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Commits the transaction. Calls after the job has ended are no-ops.
    pub fn commit(&mut self) -> Result<(), Status> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.tx
            .commit()
            .map_err(|e| Status::from(e).wrap("can't commit job"))?;
        self.committed = true;
        Ok(())
    }

    /// Rolls back the transaction. Calls after the job has ended are no-ops.
    pub fn rollback(&mut self) -> Result<(), Status> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.tx
            .rollback()
            .map_err(|e| Status::from(e).wrap("can't rollback job"))
    }

    /// Ends a task's use of the job: rolls back unless already committed,
    /// keeping the task's own failure over any rollback failure.
    pub fn revert<T>(&mut self, res: Result<T, Status>) -> Result<T, Status> {
        if self.done {
            return res;
        }
        match (res, self.rollback()) {
            (res, Ok(())) => res,
            (Ok(_), Err(rb)) => Err(rb),
            (Err(sts), Err(rb)) => {
                warn!("suppressed rollback failure: {}", rb);
                Err(sts)
            }
        }
    }

    pub fn alloc_id(&mut self) -> Result<i64, Status> {
        id::alloc_id(self.tx.as_mut(), self.adap.as_ref())
    }

    /// Reads every row matched by `opts`, decoded.
    pub fn find<T: Table>(&mut self, opts: &Opts) -> Result<Vec<T>, Status> {
        let mut rows = Vec::new();
        self.scan(opts, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Streams rows matched by `opts` to `cb`, stopping at the first error.
    pub fn scan<T, F>(&mut self, opts: &Opts, mut cb: F) -> Result<(), Status>
    where
        T: Table,
        F: FnMut(T) -> Result<(), Status>,
    {
        let name = T::DEF.name;
        builder::scan(self.tx.as_mut(), self.adap.as_ref(), name, opts, |data| {
            let row = serde_json::from_slice(data).map_err(|e| {
                Status::internal(format!("can't decode {} row", name)).with_cause(e)
            })?;
            cb(row)
        })
    }

    pub fn insert<T: Table>(&mut self, row: &T) -> Result<(), Status> {
        let (cols, vals) = row_cols_vals(row)?;
        builder::insert(self.tx.as_mut(), self.adap.as_ref(), T::DEF.name, &cols, &vals)
    }

    /// Rewrites the row identified by its primary key.
    pub fn update<T: Table>(&mut self, row: &T) -> Result<(), Status> {
        let (cols, vals) = row_cols_vals(row)?;
        builder::update(
            self.tx.as_mut(),
            self.adap.as_ref(),
            T::DEF.name,
            &cols,
            &vals,
            &row.primary_key(),
        )
    }

    /// Deletes by a fully specified unique key.
    pub fn delete<T: Table>(&mut self, key: Idx) -> Result<(), Status> {
        builder::delete(self.tx.as_mut(), self.adap.as_ref(), T::DEF.name, &key)
    }
}

impl Drop for Job<'_> {
    fn drop(&mut self) {
        if !self.done {
            debug!("job dropped without commit, rolling back");
            if let Err(e) = self.rollback() {
                warn!("rollback on drop failed: {}", e);
            }
        }
    }
}

fn row_cols_vals<T: Table>(row: &T) -> Result<(Vec<&'static str>, Vec<Value>), Status> {
    let data = serde_json::to_vec(row).map_err(|e| {
        Status::internal(format!("can't encode {} row", T::DEF.name)).with_cause(e)
    })?;
    let mut cols = col_names(T::DEF);
    cols.push(DATA_COL);
    let mut vals = row.key_vals();
    vals.push(Value::Blob(data));
    Ok((cols, vals))
}

macro_rules! table_methods {
    ($($model:ty, $primary:ty => $find:ident, $insert:ident, $update:ident, $delete:ident;)+) => {
        impl Job<'_> {
            $(
                pub fn $find(&mut self, opts: &Opts) -> Result<Vec<$model>, Status> {
                    self.find(opts)
                }

                pub fn $insert(&mut self, row: &$model) -> Result<(), Status> {
                    self.insert(row)
                }

                pub fn $update(&mut self, row: &$model) -> Result<(), Status> {
                    self.update(row)
                }

                pub fn $delete(&mut self, key: $primary) -> Result<(), Status> {
                    self.delete::<$model>(key.into())
                }
            )+
        }
    };
}

table_methods! {
    Pic, PicsPrimary => find_pics, insert_pic, update_pic, delete_pic;
    Tag, TagsPrimary => find_tags, insert_tag, update_tag, delete_tag;
    PicTag, PicTagsPrimary => find_pic_tags, insert_pic_tag, update_pic_tag, delete_pic_tag;
    PicComment, PicCommentsPrimary =>
        find_pic_comments, insert_pic_comment, update_pic_comment, delete_pic_comment;
    PicVote, PicVotesPrimary => find_pic_votes, insert_pic_vote, update_pic_vote, delete_pic_vote;
    PicIdent, PicIdentsPrimary =>
        find_pic_idents, insert_pic_ident, update_pic_ident, delete_pic_ident;
    User, UsersPrimary => find_users, insert_user, update_user, delete_user;
    UserEvent, UserEventsPrimary =>
        find_user_events, insert_user_event, update_user_event, delete_user_event;
}

/// Primary key of a row, in the typed form the per-table deletes take.
pub fn key_for_pic(p: &Pic) -> PicsPrimary {
    PicsPrimary {
        pic_id: Some(p.pic_id),
    }
}

pub fn key_for_tag(t: &Tag) -> TagsPrimary {
    TagsPrimary {
        tag_id: Some(t.tag_id),
    }
}

pub fn key_for_pic_tag(pt: &PicTag) -> PicTagsPrimary {
    PicTagsPrimary {
        pic_id: Some(pt.pic_id),
        tag_id: Some(pt.tag_id),
    }
}

pub fn key_for_pic_comment(pc: &PicComment) -> PicCommentsPrimary {
    PicCommentsPrimary {
        pic_id: Some(pc.pic_id),
        comment_id: Some(pc.comment_id),
    }
}

pub fn key_for_pic_vote(pv: &PicVote) -> PicVotesPrimary {
    PicVotesPrimary {
        pic_id: Some(pv.pic_id),
        user_id: Some(pv.user_id),
        index: Some(pv.index),
    }
}

pub fn key_for_pic_ident(pi: &PicIdent) -> PicIdentsPrimary {
    PicIdentsPrimary {
        pic_id: Some(pi.pic_id),
        ident_type: Some(pi.ident_type.as_i64()),
        value: Some(pi.value.clone()),
    }
}

pub fn key_for_user(u: &User) -> UsersPrimary {
    UsersPrimary {
        user_id: Some(u.user_id),
    }
}
