use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Shared, immutable handle to the error that caused a [`Status`].
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// Coarse, machine readable failure category.
///
/// Transport layers map these 1:1 onto their own codes, so lower layers should
/// pick the most specific one they can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    /// Optimistic concurrency conflict; safe to retry with fresh data.
    Aborted,
    Internal,
    DataLoss,
    Unimplemented,
    Unknown,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::InvalidArgument => "invalid_argument",
            Code::NotFound => "not_found",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::Unauthenticated => "unauthenticated",
            Code::Aborted => "aborted",
            Code::Internal => "internal",
            Code::DataLoss => "data_loss",
            Code::Unimplemented => "unimplemented",
            Code::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (code, message, cause) triple used as the error type of every core layer.
///
/// Once built a status is never mutated; [`Status::wrap`] produces a new value
/// that keeps the code and cause.
#[derive(Clone)]
pub struct Status {
    code: Code,
    message: String,
    cause: Option<Cause>,
}

macro_rules! status_ctor {
    ($($(#[$doc:meta])* $name:ident => $code:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(message: impl Into<String>) -> Self {
                Self::new(Code::$code, message)
            }
        )*
    };
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Attaches the error that led to this status.
    pub fn with_cause<E>(self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Arc::new(cause)),
            ..self
        }
    }

    status_ctor! {
        invalid_argument => InvalidArgument,
        not_found => NotFound,
        already_exists => AlreadyExists,
        permission_denied => PermissionDenied,
        unauthenticated => Unauthenticated,
        /// Version mismatch or another conflict the caller may retry.
        aborted => Aborted,
        internal => Internal,
        /// Something that was committed could not be fully cleaned up.
        data_loss => DataLoss,
        unimplemented => Unimplemented,
        unknown => Unknown,
    }

    /// Converts an arbitrary error into a status.
    ///
    /// A status passed in is returned untouched so its code is never
    /// downgraded; anything else becomes `Unknown`.
    pub fn from_err<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        let boxed: Box<dyn Error + Send + Sync> = Box::new(err);
        match boxed.downcast::<Status>() {
            Ok(sts) => *sts,
            Err(other) => {
                let message = other.to_string();
                Self {
                    code: Code::Unknown,
                    message,
                    cause: Some(Arc::from(other)),
                }
            }
        }
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Adds context while keeping the code and cause.
    pub fn wrap(self, context: impl fmt::Display) -> Self {
        Self {
            code: self.code,
            message: format!("{}: {}", context, self.message),
            cause: self.cause,
        }
    }

    /// Walks the full cause chain, starting with the direct cause.
    pub fn causes(&self) -> impl Iterator<Item = &(dyn Error + 'static)> {
        let first = self.cause.as_deref().map(|c| c as &(dyn Error + 'static));
        std::iter::successors(first, |&e| e.source())
    }

    /// Finds the first error of type `T` anywhere in the cause chain.
    pub fn find_cause<T: Error + 'static>(&self) -> Option<&T> {
        self.causes().find_map(|e| e.downcast_ref::<T>())
    }
}

/// First-failure-wins: `new` only lands in `cap` if nothing was captured yet.
pub fn replace_or_suppress(cap: &mut Option<Status>, new: Status) {
    match cap {
        None => *cap = Some(new),
        Some(existing) => {
            tracing::warn!(kept = %existing, suppressed = %new, "suppressing secondary failure");
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " [{}]", cause)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Status")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl Error for Status {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl Error for Boom {}

    #[test]
    fn from_err_keeps_status_code() {
        let inner = Status::aborted("version mismatch");
        let sts = Status::from_err(inner);
        assert_eq!(sts.code(), Code::Aborted);
        assert_eq!(sts.message(), "version mismatch");
    }

    #[test]
    fn from_err_plain_error_is_unknown() {
        let sts = Status::from_err(Boom);
        assert_eq!(sts.code(), Code::Unknown);
        assert!(sts.find_cause::<Boom>().is_some());
    }

    #[test]
    fn wrap_keeps_code_and_cause() {
        let sts = Status::internal("can't commit").with_cause(Boom).wrap("create user");
        assert_eq!(sts.code(), Code::Internal);
        assert_eq!(sts.message(), "create user: can't commit");
        assert!(sts.find_cause::<Boom>().is_some());
    }

    #[test]
    fn causes_walks_nested_statuses() {
        let inner = Status::internal("driver").with_cause(Boom);
        let outer = Status::unauthenticated("not signed in").with_cause(inner);
        let codes: Vec<String> = outer.causes().map(|e| e.to_string()).collect();
        assert_eq!(codes.len(), 2);
        assert!(outer.find_cause::<Boom>().is_some());
    }

    #[test]
    fn first_failure_wins() {
        let mut cap = None;
        replace_or_suppress(&mut cap, Status::new(Code::NotFound, "first"));
        replace_or_suppress(&mut cap, Status::new(Code::DataLoss, "second"));
        let sts = cap.unwrap();
        assert_eq!(sts.code(), Code::NotFound);
        assert_eq!(sts.message(), "first");
    }

    #[test]
    fn suppression_fills_empty_slot() {
        let mut cap = None;
        replace_or_suppress(&mut cap, Status::new(Code::DataLoss, "cleanup"));
        assert_eq!(cap.unwrap().code(), Code::DataLoss);
    }
}
