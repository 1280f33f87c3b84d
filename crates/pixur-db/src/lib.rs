//! Database plumbing for Pixur: driver shapes, the composite key query
//! builder, dialect adapters, and the transaction scoped [`Job`].

pub mod adapter;
pub mod builder;
pub mod error;
pub mod id;
pub mod job;
pub mod migrations;
pub mod models;
pub mod sqlite;
pub mod tables;

use std::sync::Arc;

use pixur_types::{Context, Status};

pub use adapter::{AdapterRegistry, DbAdapter};
pub use builder::{Idx, Lock, Opts};
pub use error::DbError;
pub use job::Job;

/// A single positional statement argument or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

/// Outcome of a statement run through an [`Executor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Explicit cursor over query results.
///
/// Callers loop on `next()`, read each row with `scan()`, check `err()` once
/// `next()` returns false, and always `close()`.
pub trait Rows {
    fn next(&mut self) -> bool;
    fn scan(&self) -> Result<&[Value], DbError>;
    fn close(&mut self) -> Result<(), DbError>;
    fn err(&self) -> Option<&DbError>;
}

/// A [`Rows`] over results that were read in full before being handed out.
#[derive(Debug, Default)]
pub struct VecRows {
    rows: std::vec::IntoIter<Vec<Value>>,
    current: Option<Vec<Value>>,
    closed: bool,
}

impl VecRows {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows: rows.into_iter(),
            current: None,
            closed: false,
        }
    }
}

impl Rows for VecRows {
    fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.current = self.rows.next();
        self.current.is_some()
    }

    fn scan(&self) -> Result<&[Value], DbError> {
        self.current.as_deref().ok_or(DbError::NoRow)
    }

    fn close(&mut self) -> Result<(), DbError> {
        self.closed = true;
        self.current = None;
        Ok(())
    }

    fn err(&self) -> Option<&DbError> {
        None
    }
}

pub trait Querier {
    fn query(&mut self, query: &str, args: &[Value]) -> Result<Box<dyn Rows + '_>, DbError>;
}

pub trait Executor {
    fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult, DbError>;
}

/// Finishes a transaction. Not thread safe.
pub trait Commiter {
    /// May only succeed once. Afterwards `rollback` is a no-op returning `Ok`.
    /// On error the transaction may or may not have been applied.
    fn commit(&mut self) -> Result<(), DbError>;
    /// Reverts the transaction. Calls after the first are no-ops returning `Ok`.
    fn rollback(&mut self) -> Result<(), DbError>;
}

/// What an open transaction looks like to the rest of the crate.
pub trait QuerierExecutorCommitter: Querier + Executor + Commiter {}

impl<T: Querier + Executor + Commiter> QuerierExecutorCommitter for T {}

/// Begins transactions. A successful `begin` must be followed by `commit` or
/// `rollback` on the returned handle.
pub trait Beginner {
    fn begin(&self, ctx: &Context) -> Result<Box<dyn QuerierExecutorCommitter + '_>, DbError>;
}

/// An opened database: the entry point to creating transactions.
pub trait Db: Beginner + Send + Sync {
    fn adapter(&self) -> Arc<dyn DbAdapter>;

    /// Further `begin` calls fail once closed.
    fn close(&self) -> Result<(), DbError>;

    /// Runs each statement in one transaction. Typically used by tests and
    /// first start.
    fn init_schema(&self, ctx: &Context, stmts: &[String]) -> Result<(), Status> {
        let mut tx = self.begin(ctx)?;
        for stmt in stmts {
            if let Err(e) = tx.exec(stmt, &[]) {
                let sts = Status::from(e).wrap("can't init schema");
                if let Err(rb) = tx.rollback() {
                    tracing::warn!("rollback after failed schema init: {}", rb);
                }
                return Err(sts);
            }
        }
        tx.commit()?;
        Ok(())
    }
}
