//! Database access: the dialect service, the connection boundary bulk operations drive, and the
//! Postgres and SQLite drivers behind it.

pub mod common_sql;
mod connection;
mod dialect;
pub mod postgres;
mod sql_value;
pub mod sqlite;
pub mod sqlserver;

pub use connection::{BulkConnection, DatabaseError, RowSource};
pub use dialect::{BulkStatement, DialectCapabilities, SqlDialect};
pub use sql_value::SqlValue;
