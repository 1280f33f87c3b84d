use std::sync::Arc;

use pixur_types::Status;

use super::{DbAdapter, quote_ident};
use crate::builder::Lock;
use crate::error::DbError;
use crate::Db;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

const FORBIDDEN: &[char] = &['"', '\0'];

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

impl DbAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, ident: &str) -> String {
        quote_ident(ident, '"', FORBIDDEN)
    }

    fn blob_idx_quote(&self, ident: &str) -> String {
        quote_ident(ident, '"', FORBIDDEN)
    }

    fn lock_stmt(&self, buf: &mut String, lock: Lock) {
        match lock {
            Lock::None => {}
            Lock::Read => buf.push_str(" FOR SHARE"),
            Lock::Write => buf.push_str(" FOR UPDATE"),
        }
    }

    fn bool_type(&self) -> &'static str {
        "bool"
    }

    fn int_type(&self) -> &'static str {
        "integer"
    }

    fn big_int_type(&self) -> &'static str {
        "bigint"
    }

    fn blob_type(&self) -> &'static str {
        "bytea"
    }

    fn single_tx(&self) -> bool {
        false
    }

    fn retryable_err(&self, err: &DbError) -> bool {
        match err {
            DbError::Driver { code, .. } => {
                code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED
            }
            _ => false,
        }
    }

    fn open(&self, _data_source: &str) -> Result<Arc<dyn Db>, Status> {
        Err(Status::unimplemented("postgres: no driver linked"))
    }

    fn open_for_test(&self) -> Result<Arc<dyn Db>, Status> {
        Err(Status::unimplemented("postgres: no driver linked"))
    }
}
