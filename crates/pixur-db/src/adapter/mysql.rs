use std::sync::Arc;

use pixur_types::Status;

use super::{DbAdapter, quote_ident};
use crate::builder::Lock;
use crate::error::DbError;
use crate::Db;

/// ER_LOCK_DEADLOCK
const ER_LOCK_DEADLOCK: &str = "1213";
/// ER_LOCK_WAIT_TIMEOUT
const ER_LOCK_WAIT_TIMEOUT: &str = "1205";

const FORBIDDEN: &[char] = &['"', '\0', '`'];

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlAdapter;

impl DbAdapter for MysqlAdapter {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        quote_ident(ident, '`', FORBIDDEN)
    }

    fn blob_idx_quote(&self, ident: &str) -> String {
        quote_ident(ident, '`', FORBIDDEN) + "(255)"
    }

    fn lock_stmt(&self, buf: &mut String, lock: Lock) {
        match lock {
            Lock::None => {}
            Lock::Read => buf.push_str(" LOCK IN SHARE MODE"),
            Lock::Write => buf.push_str(" FOR UPDATE"),
        }
    }

    fn bool_type(&self) -> &'static str {
        "bool"
    }

    fn int_type(&self) -> &'static str {
        "int"
    }

    fn big_int_type(&self) -> &'static str {
        "bigint(20)"
    }

    fn blob_type(&self) -> &'static str {
        "blob"
    }

    fn single_tx(&self) -> bool {
        false
    }

    fn retryable_err(&self, err: &DbError) -> bool {
        match err {
            DbError::Driver { code, .. } => code == ER_LOCK_DEADLOCK || code == ER_LOCK_WAIT_TIMEOUT,
            _ => false,
        }
    }

    fn open(&self, _data_source: &str) -> Result<Arc<dyn Db>, Status> {
        Err(Status::unimplemented("mysql: no driver linked"))
    }

    fn open_for_test(&self) -> Result<Arc<dyn Db>, Status> {
        Err(Status::unimplemented("mysql: no driver linked"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(MysqlAdapter.quote("pic_id"), "`pic_id`");
        assert_eq!(MysqlAdapter.blob_idx_quote("value"), "`value`(255)");
    }

    #[test]
    #[should_panic(expected = "Invalid identifier")]
    fn backtick_is_rejected() {
        MysqlAdapter.quote("a`b");
    }

    #[test]
    fn deadlocks_and_lock_waits_retry() {
        assert!(MysqlAdapter.retryable_err(&DbError::driver("1213", "Deadlock found")));
        assert!(MysqlAdapter.retryable_err(&DbError::driver("1205", "Lock wait timeout")));
        assert!(!MysqlAdapter.retryable_err(&DbError::driver("1062", "Duplicate entry")));
        assert!(!MysqlAdapter.retryable_err(&DbError::Closed));
    }
}
