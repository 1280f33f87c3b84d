//! SQL dialect strategies and the registry that selects one by name.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use pixur_types::Status;
use tracing::info;

use crate::builder::Lock;
use crate::error::DbError;
use crate::Db;

/// Per engine dialect details and error classification.
pub trait DbAdapter: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Quotes an identifier.
    ///
    /// # Panics
    ///
    /// On identifiers containing quote or NUL characters. Identifiers are
    /// static program strings, never user input.
    fn quote(&self, ident: &str) -> String;

    /// Quotes a blob column for use inside an index definition. Some engines
    /// need an explicit prefix length here.
    fn blob_idx_quote(&self, ident: &str) -> String;

    /// Appends the row lock clause for `lock`, if any.
    fn lock_stmt(&self, buf: &mut String, lock: Lock);

    fn bool_type(&self) -> &'static str;
    fn int_type(&self) -> &'static str;
    fn big_int_type(&self) -> &'static str;
    fn blob_type(&self) -> &'static str;

    /// Is this database inherently single writer?
    fn single_tx(&self) -> bool;

    /// Can the operation that produced `err` be retried from scratch?
    fn retryable_err(&self, err: &DbError) -> bool;

    fn open(&self, data_source: &str) -> Result<Arc<dyn Db>, Status>;

    /// Opens a throwaway database, typically in memory.
    fn open_for_test(&self) -> Result<Arc<dyn Db>, Status>;
}

/// Shared quoting rule: wrap in `quote`, rejecting any char in `forbidden`.
pub(crate) fn quote_ident(ident: &str, quote: char, forbidden: &[char]) -> String {
    if ident.contains(forbidden) {
        panic!("Invalid identifier {:?}", ident);
    }
    format!("{quote}{ident}{quote}")
}

/// Adapters available to the process, keyed by name.
///
/// Built once at start up and only read afterwards.
#[derive(Debug, Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<&'static str, Arc<dyn DbAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every adapter that ships with this crate.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(mysql::MysqlAdapter));
        reg.register(Arc::new(postgres::PostgresAdapter));
        reg.register(Arc::new(sqlite::SqliteAdapter));
        reg
    }

    /// # Panics
    ///
    /// If an adapter with the same name is already present.
    pub fn register(&mut self, adapter: Arc<dyn DbAdapter>) {
        let name = adapter.name();
        if self.adapters.insert(name, adapter).is_some() {
            panic!("{} already present", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DbAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Sorted adapter names.
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.keys().copied().collect()
    }

    /// Opens `data_source` with the adapter registered as `adapter_name`.
    pub fn open(&self, adapter_name: &str, data_source: &str) -> Result<Arc<dyn Db>, Status> {
        let adapter = self.lookup(adapter_name)?;
        info!("Opening {} database", adapter.name());
        adapter.open(data_source)
    }

    pub fn open_for_test(&self, adapter_name: &str) -> Result<Arc<dyn Db>, Status> {
        self.lookup(adapter_name)?.open_for_test()
    }

    fn lookup(&self, adapter_name: &str) -> Result<Arc<dyn DbAdapter>, Status> {
        self.get(adapter_name)
            .ok_or_else(|| Status::invalid_argument(format!("no adapter {}", adapter_name)))
    }
}
