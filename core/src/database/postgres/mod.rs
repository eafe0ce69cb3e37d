mod client;
mod dialect;

pub use client::{connection_string, PostgresClient, PostgresConnection, PostgresConnectionError};
pub use dialect::PostgresDialect;
