//! Error types for the auto-increment collector

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while collecting and publishing metrics
#[derive(Error, Debug)]
pub enum Error {
    /// Database unreachable or no pooled connection available
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    /// Query reached the database but failed
    #[error("Query failed ({context}): {source}")]
    Query {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Result row does not have the expected shape
    #[error("Failed to decode row: {0}")]
    Decode(String),

    /// Textual value could not be converted to an integer
    #[error("Failed to parse {value:?} as an integer ({context})")]
    Parse { value: String, context: String },

    /// Monitoring sink rejected a sample
    #[error("Publish rejected: {0}")]
    Publish(String),

    /// Monitoring sink unreachable
    #[error("Publish transport error: {0}")]
    PublishTransport(#[source] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker did not finish within its deadline
    #[error("{worker} timed out after {duration:?}")]
    Timeout { worker: String, duration: Duration },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// One or more concurrent workers failed
    #[error("{0}")]
    Aggregate(FailureSet),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Query,
    Decode,
    Parse,
    Publish,
    Config,
    Timeout,
    Internal,
    Aggregate,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::Query { .. } => ErrorKind::Query,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Publish(_) | Error::PublishTransport(_) => ErrorKind::Publish,
            Error::Config(_) => ErrorKind::Config,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Internal(_) => ErrorKind::Internal,
            Error::Aggregate(_) => ErrorKind::Aggregate,
        }
    }

    /// Build a query error with context.
    pub fn query(context: impl Into<String>, source: sqlx::Error) -> Self {
        Error::Query {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error, or any failure nested inside it, is of `kind`.
    pub fn contains_kind(&self, kind: ErrorKind) -> bool {
        match self {
            Error::Aggregate(set) => {
                kind == ErrorKind::Aggregate
                    || set.iter().any(|f| f.error.contains_kind(kind))
            }
            other => other.kind() == kind,
        }
    }
}

// =============================================================================
// Failure Accumulation
// =============================================================================

/// A failure attributed to the worker that produced it.
#[derive(Debug)]
pub struct Failure {
    /// Identity of the failed worker (table name, fetcher name)
    pub source: String,
    pub error: Error,
}

impl Failure {
    pub fn new(source: impl Into<String>, error: Error) -> Self {
        Self {
            source: source.into(),
            error,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.error)
    }
}

/// Typed list of worker failures collected at a fan-out barrier.
///
/// Failures are kept as values and only rendered to text by `Display`.
#[derive(Debug, Default)]
pub struct FailureSet {
    failures: Vec<Failure>,
}

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Into<String>, error: Error) {
        self.failures.push(Failure::new(source, error));
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        self.failures.iter()
    }

    /// Source identities of every failure, in collection order.
    pub fn sources(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.source.as_str()).collect()
    }

    /// Find the failure recorded for `source`.
    pub fn get(&self, source: &str) -> Option<&Failure> {
        self.failures.iter().find(|f| f.source == source)
    }

    /// `None` when nothing failed, so callers cannot mistake an empty set for an error.
    pub fn into_option(self) -> Option<FailureSet> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// `Ok(())` when empty, otherwise `Error::Aggregate`.
    pub fn into_result(self) -> Result<()> {
        match self.into_option() {
            None => Ok(()),
            Some(set) => Err(Error::Aggregate(set)),
        }
    }
}

impl IntoIterator for FailureSet {
    type Item = Failure;
    type IntoIter = std::vec::IntoIter<Failure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

impl fmt::Display for FailureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s): ", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_set_is_no_error() {
        let set = FailureSet::new();
        assert!(set.is_empty());
        assert!(set.into_result().is_ok());
    }

    #[test]
    fn test_failures_keep_identity_and_order() {
        let mut set = FailureSet::new();
        set.push("orders", Error::Decode("bad row".into()));
        set.push(
            "users",
            Error::Parse {
                value: "abc".into(),
                context: "users.id".into(),
            },
        );

        assert_eq!(set.len(), 2);
        assert_eq!(set.sources(), vec!["orders", "users"]);
        assert_matches!(set.get("users").map(|f| f.error.kind()), Some(ErrorKind::Parse));

        let err = set.into_result().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.starts_with("2 failure(s): "));
        assert!(rendered.contains("[orders] Failed to decode row: bad row"));
        assert!(rendered.contains("[users]"));
    }

    #[test]
    fn test_contains_kind_looks_through_nesting() {
        let mut inner = FailureSet::new();
        inner.push(
            "orders",
            Error::Timeout {
                worker: "table orders".into(),
                duration: Duration::from_secs(1),
            },
        );
        let mut outer = FailureSet::new();
        outer.push("auto_increment", Error::Aggregate(inner));
        let err = Error::Aggregate(outer);

        assert!(err.contains_kind(ErrorKind::Timeout));
        assert!(!err.contains_kind(ErrorKind::Query));
        assert_eq!(err.kind(), ErrorKind::Aggregate);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
        assert_eq!(Error::Publish("x".into()).kind(), ErrorKind::Publish);
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);
        assert_eq!(
            Error::query("describe", sqlx::Error::RowNotFound).kind(),
            ErrorKind::Query
        );
        assert_eq!(
            Error::Connection(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::Connection
        );
    }
}
