use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Configuration;

/// The authenticated caller, as established by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthToken {
    pub user_id: i64,
}

/// Per request ambient data handed to every task and transaction.
///
/// An absent subject means the caller is anonymous.
#[derive(Debug, Clone, Default)]
pub struct Context {
    subject: Option<AuthToken>,
    configuration: Option<Arc<Configuration>>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, user_id: i64) -> Self {
        self.subject = Some(AuthToken { user_id });
        self
    }

    pub fn with_configuration(mut self, conf: Arc<Configuration>) -> Self {
        self.configuration = Some(conf);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn subject(&self) -> Option<AuthToken> {
        self.subject
    }

    pub fn configuration(&self) -> Option<&Arc<Configuration>> {
        self.configuration.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
