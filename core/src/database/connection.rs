use std::sync::Arc;

use async_trait::async_trait;
use bb8::RunError;
use tokio_util::sync::CancellationToken;

use crate::{
    bulk::BulkError,
    database::{SqlDialect, SqlValue},
    metadata::StoreType,
};

#[derive(thiserror::Error, Debug)]
pub enum DatabaseError {
    #[error("PgError {0}")]
    PgError(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] RunError<tokio_postgres::Error>),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Failed to acquire connection lock")]
    ConnectionLockError,

    #[error("Blocking database task failed: {0}")]
    TaskJoinError(#[from] tokio::task::JoinError),

    #[error("{0} does not offer a native bulk copy channel")]
    CopyNotSupported(&'static str),

    /// A failure of the row source feeding a driver channel, not of the driver itself.
    #[error(transparent)]
    RowSource(Box<BulkError>),
}

/// Forward-only supply of materialized rows for a native bulk channel.
pub trait RowSource: Send {
    fn column_count(&self) -> usize;

    /// Advances to the next row. The returned slice is valid until the next call.
    fn next_row(&mut self) -> Result<Option<&[SqlValue]>, BulkError>;
}

/// A single open connection that a bulk operation drives from start to end.
///
/// Implementations bind parameters positionally, in the order the statement was generated.
#[async_trait]
pub trait BulkConnection: Send {
    type Statement: Send + Sync;

    fn dialect(&self) -> Arc<dyn SqlDialect>;

    async fn prepare(&mut self, sql: &str) -> Result<Self::Statement, DatabaseError>;

    async fn execute_prepared(
        &mut self,
        statement: &Self::Statement,
        params: &[SqlValue],
    ) -> Result<u64, DatabaseError>;

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DatabaseError>;

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DatabaseError>;

    async fn query(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Vec<SqlValue>>, DatabaseError>;

    /// Runs `sql` and returns its affected row count, read back with `row_count_sql` when the
    /// driver does not report it. Connections that share a session with other callers must run
    /// both statements without letting another statement in between.
    async fn execute_counted(&mut self, sql: &str, row_count_sql: Option<&str>) -> Result<u64, DatabaseError> {
        let affected = self.execute(sql, &[]).await?;
        let Some(row_count_sql) = row_count_sql else {
            return Ok(affected);
        };

        let rows = self.query(row_count_sql, &[]).await?;
        Ok(read_row_count(&rows).unwrap_or(affected))
    }

    /// Streams every row of `rows` through the dialect's native bulk channel and returns the
    /// number of rows transferred.
    async fn copy_in(
        &mut self,
        _sql: &str,
        _column_types: &[StoreType],
        _rows: &mut (dyn RowSource + '_),
        _cancellation: &CancellationToken,
    ) -> Result<u64, DatabaseError> {
        Err(DatabaseError::CopyNotSupported(self.dialect().name()))
    }
}

/// The single integer a row count query returns.
pub(crate) fn read_row_count(rows: &[Vec<SqlValue>]) -> Option<u64> {
    rows.first()
        .and_then(|row| row.first())
        .and_then(SqlValue::as_i64)
        .map(|count| u64::try_from(count).unwrap_or_default())
}
