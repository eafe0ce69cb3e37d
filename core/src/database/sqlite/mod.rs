mod client;
mod dialect;

pub use client::{connection_string, SqliteClient, SqliteConnection, SqliteConnectionError};
pub use dialect::SqliteDialect;
