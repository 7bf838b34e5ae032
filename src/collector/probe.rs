//! Column Value Probe
//!
//! Reads the current maximum of a column and converts it to an integer.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::domain::ports::DatabaseClient;
use crate::error::{Error, Result};

/// What an empty column (`MAX` returns NULL) contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum EmptyColumnPolicy {
    /// Treat the missing maximum as a parse failure
    #[default]
    Fail,
    /// Treat the missing maximum as zero
    Zero,
}

/// Reads column maxima.
#[derive(Clone)]
pub struct ColumnValueProbe {
    db: Arc<dyn DatabaseClient>,
    policy: EmptyColumnPolicy,
}

impl ColumnValueProbe {
    pub fn new(db: Arc<dyn DatabaseClient>, policy: EmptyColumnPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> EmptyColumnPolicy {
        self.policy
    }

    /// Current maximum of `table.column`.
    #[instrument(skip(self))]
    pub async fn max_value(&self, table: &str, column: &str) -> Result<i64> {
        let raw = self.db.max_column_value(table, column).await?;
        let value = parse_max_value(raw.as_deref(), self.policy, table, column)?;
        debug!("Max of {}.{} is {}", table, column, value);
        Ok(value)
    }
}

impl std::fmt::Debug for ColumnValueProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnValueProbe")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Convert the textual maximum returned by the database.
pub fn parse_max_value(
    raw: Option<&str>,
    policy: EmptyColumnPolicy,
    table: &str,
    column: &str,
) -> Result<i64> {
    let context = || format!("max of {}.{}", table, column);

    match (raw, policy) {
        (None, EmptyColumnPolicy::Zero) => Ok(0),
        (None, EmptyColumnPolicy::Fail) => Err(Error::Parse {
            value: "NULL".to_string(),
            context: context(),
        }),
        (Some(text), _) => text.trim().parse::<i64>().map_err(|_| Error::Parse {
            value: text.to_string(),
            context: context(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDatabase, InMemoryTable};
    use crate::error::ErrorKind;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_integer() {
        assert_eq!(
            parse_max_value(Some("42"), EmptyColumnPolicy::Fail, "t", "id").unwrap(),
            42
        );
        assert_eq!(
            parse_max_value(Some(" 7 "), EmptyColumnPolicy::Fail, "t", "id").unwrap(),
            7
        );
    }

    #[test]
    fn test_empty_column_fails_by_default() {
        let err = parse_max_value(None, EmptyColumnPolicy::default(), "orders", "id").unwrap_err();
        assert_matches!(err, Error::Parse { value, context } => {
            assert_eq!(value, "NULL");
            assert_eq!(context, "max of orders.id");
        });
    }

    #[test]
    fn test_empty_column_zero_policy() {
        assert_eq!(
            parse_max_value(None, EmptyColumnPolicy::Zero, "orders", "id").unwrap(),
            0
        );
    }

    #[test]
    fn test_non_numeric_fails_under_both_policies() {
        for policy in [EmptyColumnPolicy::Fail, EmptyColumnPolicy::Zero] {
            let err = parse_max_value(Some("abc"), policy, "t", "id").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse);
        }
    }

    #[test]
    fn test_out_of_range_fails() {
        let err = parse_max_value(
            Some("18446744073709551615"),
            EmptyColumnPolicy::Fail,
            "t",
            "id",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_probe_reads_database() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("orders").auto_increment("id", Some(99)));
        let probe = ColumnValueProbe::new(Arc::new(db), EmptyColumnPolicy::Fail);

        assert_eq!(probe.max_value("orders", "id").await.unwrap(), 99);
    }

    #[tokio::test]
    async fn test_probe_query_failure() {
        let db = InMemoryDatabase::new().with_table(
            InMemoryTable::new("orders")
                .auto_increment("id", Some(99))
                .fail_max("deadlock"),
        );
        let probe = ColumnValueProbe::new(Arc::new(db), EmptyColumnPolicy::Fail);

        let err = probe.max_value("orders", "id").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }
}
