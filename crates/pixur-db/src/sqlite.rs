//! In-tree SQLite driver built on rusqlite.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use pixur_types::{Context, Status};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, params_from_iter};
use tracing::{info, warn};

use crate::adapter::DbAdapter;
use crate::error::DbError;
use crate::{
    Beginner, Commiter, Db, ExecResult, Executor, Querier, QuerierExecutorCommitter, Rows,
    Value, VecRows,
};

/// How many VM instructions run between deadline checks.
const PROGRESS_OPS: i32 = 1000;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single connection; transactions are serialized on it.
pub struct SqliteDb {
    conn: Mutex<Option<Connection>>,
    adapter: Arc<dyn DbAdapter>,
}

impl SqliteDb {
    pub fn open(path: &str, adapter: Arc<dyn DbAdapter>) -> Result<Self, Status> {
        let conn = Connection::open(path)
            .map_err(|e| Status::internal(format!("can't open {}", path)).with_cause(DbError::from(e)))?;

        if path != ":memory:" {
            // WAL mode for concurrent reads
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(DbError::from)?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(DbError::from)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(DbError::from)?;

        info!("Database opened at {}", path);
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            adapter,
        })
    }
}

impl Beginner for SqliteDb {
    fn begin(&self, ctx: &Context) -> Result<Box<dyn QuerierExecutorCommitter + '_>, DbError> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| DbError::Poisoned(e.to_string()))?;
        if ctx.deadline_exceeded() {
            return Err(DbError::DeadlineExceeded);
        }
        let conn = guard.as_ref().ok_or(DbError::Closed)?;

        // The handler belongs to the connection, so it is replaced on every
        // begin and never outlives the transaction that installed it.
        let deadline = ctx.deadline();
        match deadline {
            Some(deadline) => {
                conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline))
            }
            None => clear_progress_handler(conn),
        }
        // IMMEDIATE takes the write lock up front, so readers never need to
        // upgrade mid transaction.
        if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE") {
            clear_progress_handler(conn);
            return Err(classify(e, deadline));
        }

        Ok(Box::new(SqliteTx {
            guard,
            deadline,
            done: false,
        }))
    }
}

impl Db for SqliteDb {
    fn adapter(&self) -> Arc<dyn DbAdapter> {
        Arc::clone(&self.adapter)
    }

    fn close(&self) -> Result<(), DbError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::Poisoned(e.to_string()))?;
        match guard.take() {
            Some(conn) => conn.close().map_err(|(_, e)| DbError::from(e)),
            None => Ok(()),
        }
    }
}

struct SqliteTx<'a> {
    guard: MutexGuard<'a, Option<Connection>>,
    deadline: Option<Instant>,
    done: bool,
}

impl SqliteTx<'_> {
    fn conn(&self) -> Result<&Connection, DbError> {
        self.guard.as_ref().ok_or(DbError::Closed)
    }

    fn live_conn(&self) -> Result<&Connection, DbError> {
        if self.done {
            return Err(DbError::TxDone);
        }
        self.conn()
    }

    fn classify(&self, err: rusqlite::Error) -> DbError {
        classify(err, self.deadline)
    }

    fn finish(&mut self, stmt: &str) -> Result<(), DbError> {
        self.done = true;
        let conn = self.conn()?;
        let res = conn.execute_batch(stmt);
        clear_progress_handler(conn);
        res.map_err(|e| self.classify(e))
    }
}

impl Querier for SqliteTx<'_> {
    fn query(&mut self, query: &str, args: &[Value]) -> Result<Box<dyn Rows + '_>, DbError> {
        let conn = self.live_conn()?;
        let mut stmt = conn.prepare(query).map_err(|e| self.classify(e))?;
        let ncols = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| self.classify(e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| self.classify(e))? {
            let mut vals = Vec::with_capacity(ncols);
            for i in 0..ncols {
                vals.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(vals);
        }
        Ok(Box::new(VecRows::new(out)))
    }
}

impl Executor for SqliteTx<'_> {
    fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult, DbError> {
        let conn = self.live_conn()?;
        let n = conn
            .execute(query, params_from_iter(args.iter()))
            .map_err(|e| self.classify(e))?;
        Ok(ExecResult {
            rows_affected: n as u64,
            last_insert_id: Some(conn.last_insert_rowid()),
        })
    }
}

impl Commiter for SqliteTx<'_> {
    fn commit(&mut self) -> Result<(), DbError> {
        if self.done {
            return Err(DbError::TxDone);
        }
        let res = self.finish("COMMIT");
        if res.is_err() {
            // A failed COMMIT leaves the transaction open on the connection.
            if let Ok(conn) = self.conn() {
                if !conn.is_autocommit() {
                    if let Err(e) = conn.execute_batch("ROLLBACK") {
                        warn!("rollback after failed commit: {}", e);
                    }
                }
            }
        }
        res
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        if self.done {
            return Ok(());
        }
        // A rollback must not be interrupted by an expired deadline.
        if let Ok(conn) = self.conn() {
            clear_progress_handler(conn);
        }
        self.finish("ROLLBACK")
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.done {
            if let Err(e) = self.rollback() {
                warn!("rollback on drop failed: {}", e);
            }
        }
    }
}

fn clear_progress_handler(conn: &Connection) {
    conn.progress_handler(0, None::<fn() -> bool>);
}

/// Interrupts caused by our own progress handler are deadline failures.
fn classify(err: rusqlite::Error, deadline: Option<Instant>) -> DbError {
    let interrupted = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    );
    if interrupted && deadline.is_some_and(|d| Instant::now() >= d) {
        return DbError::DeadlineExceeded;
    }
    DbError::Sqlite(err)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_value_ref(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Text(f.to_string()),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::sqlite::SqliteAdapter;
    use std::path::PathBuf;

    fn open() -> SqliteDb {
        let db = SqliteDb::open(":memory:", Arc::new(SqliteAdapter)).unwrap();
        db.init_schema(
            &Context::new(),
            &["CREATE TABLE t (k integer PRIMARY KEY, v blob);".to_string()],
        )
        .unwrap();
        db
    }

    fn count(db: &SqliteDb) -> usize {
        let ctx = Context::new();
        let mut tx = db.begin(&ctx).unwrap();
        let mut rows = tx.query("SELECT k FROM t;", &[]).unwrap();
        let mut n = 0;
        while rows.next() {
            n += 1;
        }
        rows.close().unwrap();
        n
    }

    #[test]
    fn commit_persists() {
        let db = open();
        let ctx = Context::new();
        let mut tx = db.begin(&ctx).unwrap();
        tx.exec("INSERT INTO t (k, v) VALUES (?, ?);", &[Value::Int(1), Value::Blob(vec![7])])
            .unwrap();
        tx.commit().unwrap();
        drop(tx);
        assert_eq!(count(&db), 1);
    }

    #[test]
    fn drop_rolls_back() {
        let db = open();
        let ctx = Context::new();
        {
            let mut tx = db.begin(&ctx).unwrap();
            tx.exec("INSERT INTO t (k, v) VALUES (?, ?);", &[Value::Int(1), Value::Null])
                .unwrap();
        }
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn rollback_is_idempotent() {
        let db = open();
        let ctx = Context::new();
        let mut tx = db.begin(&ctx).unwrap();
        tx.rollback().unwrap();
        tx.rollback().unwrap();
        assert!(matches!(tx.commit(), Err(DbError::TxDone)));
    }

    #[test]
    fn rollback_after_commit_is_noop() {
        let db = open();
        let ctx = Context::new();
        let mut tx = db.begin(&ctx).unwrap();
        tx.commit().unwrap();
        tx.rollback().unwrap();
    }

    #[test]
    fn query_returns_typed_values() {
        let db = open();
        let ctx = Context::new();
        let mut tx = db.begin(&ctx).unwrap();
        tx.exec("INSERT INTO t (k, v) VALUES (?, ?);", &[Value::Int(3), "hi".into()])
            .unwrap();
        let mut rows = tx.query("SELECT k, v FROM t WHERE k = ?;", &[Value::Int(3)]).unwrap();
        assert!(rows.next());
        assert_eq!(rows.scan().unwrap(), &[Value::Int(3), Value::Text("hi".into())]);
        assert!(!rows.next());
        assert!(rows.err().is_none());
        rows.close().unwrap();
    }

    #[test]
    fn closed_db_cannot_begin() {
        let db = open();
        db.close().unwrap();
        assert!(matches!(db.begin(&Context::new()), Err(DbError::Closed)));
    }

    const HEAVY_QUERY: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c \
                               WHERE x < 200000) SELECT count(*) FROM c;";

    struct TempDb {
        path: PathBuf,
    }

    impl TempDb {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "pixur-sqlite-{}-{}.db",
                std::process::id(),
                rand::random::<u64>()
            ));
            Self { path }
        }

        fn path(&self) -> &str {
            self.path.to_str().unwrap()
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let mut p = self.path.clone().into_os_string();
                p.push(suffix);
                let _ = std::fs::remove_file(p);
            }
        }
    }

    fn run_heavy(db: &SqliteDb, ctx: &Context) -> Result<(), DbError> {
        let mut tx = db.begin(ctx)?;
        let mut rows = tx.query(HEAVY_QUERY, &[])?;
        assert!(rows.next());
        assert_eq!(rows.scan()?, &[Value::Int(200_000)]);
        rows.close()?;
        drop(rows);
        tx.commit()
    }

    #[test]
    fn failed_begin_leaves_no_deadline_behind() {
        let tmp = TempDb::new();
        let db = SqliteDb::open(tmp.path(), Arc::new(SqliteAdapter)).unwrap();

        let other = Connection::open(tmp.path()).unwrap();
        other.execute_batch("BEGIN IMMEDIATE").unwrap();
        let ctx = Context::new().with_timeout(Duration::from_millis(200));
        let err = db.begin(&ctx).err().unwrap();
        assert!(matches!(
            err,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(ref e, _)) if e.code == ErrorCode::DatabaseBusy
        ));
        other.execute_batch("COMMIT").unwrap();
        assert!(ctx.deadline_exceeded());

        run_heavy(&db, &Context::new()).unwrap();
    }

    #[test]
    fn deadline_interrupts_only_its_own_transaction() {
        let db = SqliteDb::open(":memory:", Arc::new(SqliteAdapter)).unwrap();

        let ctx = Context::new().with_timeout(Duration::from_millis(20));
        let mut tx = db.begin(&ctx).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        let err = tx.query(HEAVY_QUERY, &[]).err().unwrap();
        assert!(matches!(err, DbError::DeadlineExceeded));
        tx.rollback().unwrap();
        drop(tx);

        run_heavy(&db, &Context::new()).unwrap();
    }

    #[test]
    fn expired_deadline_cannot_begin() {
        let db = open();
        let ctx = Context::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(db.begin(&ctx), Err(DbError::DeadlineExceeded)));
    }
}
