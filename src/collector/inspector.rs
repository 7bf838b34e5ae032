//! Schema Inspector
//!
//! Turns the database's raw column rows into validated `TableSchema` values.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::ports::{ColumnDescription, DatabaseClient, KeyRole, RawColumn, TableSchema};
use crate::error::{Error, Result};

/// Reads and validates table schemas.
#[derive(Clone)]
pub struct SchemaInspector {
    db: Arc<dyn DatabaseClient>,
}

impl SchemaInspector {
    pub fn new(db: Arc<dyn DatabaseClient>) -> Self {
        Self { db }
    }

    /// Describe `table`, preserving the database's column order.
    #[instrument(skip(self))]
    pub async fn inspect(&self, table: &str) -> Result<TableSchema> {
        let rows = self.db.describe_table(table).await?;
        let columns = rows
            .into_iter()
            .map(|row| decode_column(table, row))
            .collect::<Result<Vec<_>>>()?;

        debug!("Table {} has {} columns", table, columns.len());

        Ok(TableSchema {
            table: table.to_string(),
            columns,
        })
    }
}

impl std::fmt::Debug for SchemaInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaInspector").finish_non_exhaustive()
    }
}

/// Map one raw row to a `ColumnDescription`.
pub fn decode_column(table: &str, row: RawColumn) -> Result<ColumnDescription> {
    if row.field.is_empty() {
        return Err(Error::Decode(format!(
            "column without a name in table {}",
            table
        )));
    }

    let nullable = match row.null.trim().to_ascii_uppercase().as_str() {
        "YES" => true,
        "NO" => false,
        other => {
            return Err(Error::Decode(format!(
                "column {}.{} has unknown nullability {:?}",
                table, row.field, other
            )))
        }
    };

    let key_role = KeyRole::parse(&row.key).ok_or_else(|| {
        Error::Decode(format!(
            "column {}.{} has unknown key role {:?}",
            table, row.field, row.key
        ))
    })?;

    Ok(ColumnDescription {
        name: row.field,
        declared_type: row.column_type,
        nullable,
        key_role,
        default_value: row.default,
        extra: row.extra,
    })
}
