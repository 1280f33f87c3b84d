use pixur_types::Status;
use pixur_types::status::replace_or_suppress;

use crate::adapter::DbAdapter;
use crate::builder::Lock;
use crate::migrations::{SEQ_COL, SEQ_TABLE};
use crate::{QuerierExecutorCommitter, Value};

/// Draws the next id from the sequence table inside the caller's transaction.
///
/// The sequence row is read under a write lock, so concurrent transactions
/// serialize on it and never hand out the same id.
pub fn alloc_id(
    tx: &mut dyn QuerierExecutorCommitter,
    adap: &dyn DbAdapter,
) -> Result<i64, Status> {
    let mut query = format!(
        "SELECT {} FROM {}",
        adap.quote(SEQ_COL),
        adap.quote(SEQ_TABLE)
    );
    adap.lock_stmt(&mut query, Lock::Write);
    query.push(';');

    let current = read_seq(tx, &query)?;
    let next = current
        .checked_add(1)
        .ok_or_else(|| Status::internal("id sequence overflow"))?;

    let update = format!(
        "UPDATE {} SET {} = ?;",
        adap.quote(SEQ_TABLE),
        adap.quote(SEQ_COL)
    );
    tx.exec(&update, &[Value::Int(next)])
        .map_err(|e| Status::from(e).wrap("can't update id sequence"))?;
    Ok(next)
}

fn read_seq(tx: &mut dyn QuerierExecutorCommitter, query: &str) -> Result<i64, Status> {
    let mut rows = tx
        .query(query, &[])
        .map_err(|e| Status::from(e).wrap("can't read id sequence"))?;

    let mut stscap = None;
    let mut num = None;
    if rows.next() {
        match rows.scan() {
            Ok([Value::Int(n)]) => num = Some(*n),
            Ok(_) => stscap = Some(Status::internal("id sequence is not an integer")),
            Err(e) => stscap = Some(Status::from(e)),
        }
    } else if let Some(e) = rows.err() {
        stscap = Some(Status::internal(e.to_string()).wrap("can't read id sequence"));
    }
    if let Err(e) = rows.close() {
        replace_or_suppress(&mut stscap, e.into());
    }
    if let Some(sts) = stscap {
        return Err(sts);
    }
    num.ok_or_else(|| Status::internal("id sequence row missing"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sqlite::SqliteAdapter;
    use crate::{Beginner, Commiter, Db, migrations};
    use pixur_types::{Code, Context};

    #[test]
    fn ids_increase_across_transactions() {
        let db = SqliteAdapter.open_for_test().unwrap();
        let ctx = Context::new();
        db.init_schema(&ctx, &migrations::schema(&SqliteAdapter)).unwrap();

        let mut tx = db.begin(&ctx).unwrap();
        assert_eq!(alloc_id(tx.as_mut(), &SqliteAdapter).unwrap(), 1);
        assert_eq!(alloc_id(tx.as_mut(), &SqliteAdapter).unwrap(), 2);
        tx.commit().unwrap();
        drop(tx);

        let mut tx = db.begin(&ctx).unwrap();
        assert_eq!(alloc_id(tx.as_mut(), &SqliteAdapter).unwrap(), 3);
        tx.rollback().unwrap();
        drop(tx);

        let mut tx = db.begin(&ctx).unwrap();
        assert_eq!(alloc_id(tx.as_mut(), &SqliteAdapter).unwrap(), 3);
    }

    #[test]
    fn missing_sequence_row_is_internal() {
        let db = SqliteAdapter.open_for_test().unwrap();
        let ctx = Context::new();
        db.init_schema(
            &ctx,
            &["CREATE TABLE \"_id_seq\" (\"the_sequence\" integer NOT NULL);".to_string()],
        )
        .unwrap();

        let mut tx = db.begin(&ctx).unwrap();
        let err = alloc_id(tx.as_mut(), &SqliteAdapter).unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }
}
