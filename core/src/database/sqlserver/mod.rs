mod dialect;

pub use dialect::SqlServerDialect;
