use std::sync::Arc;

use pixur_types::Status;
use rusqlite::ErrorCode;

use super::{DbAdapter, quote_ident};
use crate::builder::Lock;
use crate::error::DbError;
use crate::sqlite::SqliteDb;
use crate::Db;

const FORBIDDEN: &[char] = &['"', '\0'];

/// SQLite has no row locks; every write transaction takes the database lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAdapter;

impl DbAdapter for SqliteAdapter {
    fn name(&self) -> &'static str {
        "sqlite3"
    }

    fn quote(&self, ident: &str) -> String {
        quote_ident(ident, '"', FORBIDDEN)
    }

    fn blob_idx_quote(&self, ident: &str) -> String {
        quote_ident(ident, '"', FORBIDDEN)
    }

    fn lock_stmt(&self, _buf: &mut String, _lock: Lock) {}

    fn bool_type(&self) -> &'static str {
        "integer"
    }

    fn int_type(&self) -> &'static str {
        "integer"
    }

    fn big_int_type(&self) -> &'static str {
        "integer"
    }

    fn blob_type(&self) -> &'static str {
        "blob"
    }

    fn single_tx(&self) -> bool {
        true
    }

    fn retryable_err(&self, err: &DbError) -> bool {
        match err {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    fn open(&self, data_source: &str) -> Result<Arc<dyn Db>, Status> {
        let db = SqliteDb::open(data_source, Arc::new(*self))?;
        Ok(Arc::new(db))
    }

    fn open_for_test(&self) -> Result<Arc<dyn Db>, Status> {
        self.open(":memory:")
    }
}
