use crate::{
    database::DatabaseError,
    metadata::{ConversionError, TableName},
};

#[derive(thiserror::Error, Debug)]
pub enum BulkError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported property selector: {0}")]
    UnsupportedSelector(String),

    #[error("Operation not supported: {0}")]
    NotSupportedOperation(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Bulk operation on table {table} failed: {source}")]
    OperationFailed {
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Could not convert the value of {property}: {source}")]
    Conversion {
        property: String,
        #[source]
        source: ConversionError,
    },

    #[error("The bulk operation was cancelled")]
    Cancelled,
}

impl BulkError {
    /// Wraps a driver failure for `table`. Row source failures that travelled through a driver
    /// channel come back out unwrapped.
    pub(crate) fn operation_failed(table: &TableName, error: DatabaseError) -> BulkError {
        match error {
            DatabaseError::RowSource(inner) => *inner,
            other => BulkError::OperationFailed { table: table.to_string(), source: other },
        }
    }
}
