use crate::{
    database::{
        dialect::{delimit_with, string_literal, DialectCapabilities},
        SqlDialect,
    },
    metadata::{StoreType, TableName},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            native_bulk_copy: false,
            per_row_update: true,
            table_hints: false,
            null_assigns_identity: true,
        }
    }

    fn identifier_quote(&self) -> char {
        '"'
    }

    fn delimit_identifier(&self, identifier: &str) -> String {
        delimit_with(identifier, '"', '"')
    }

    fn parameter(&self, position: usize) -> String {
        format!("?{}", position)
    }

    fn column_type(&self, store_type: StoreType) -> &'static str {
        match store_type {
            StoreType::Bool | StoreType::SmallInt | StoreType::Integer | StoreType::BigInt => {
                "INTEGER"
            }
            StoreType::Double => "REAL",
            StoreType::Numeric => "NUMERIC",
            StoreType::Bytes => "BLOB",
            StoreType::Text | StoreType::Uuid | StoreType::Timestamp | StoreType::Json => "TEXT",
        }
    }

    fn row_count_query(&self) -> Option<&'static str> {
        Some("SELECT changes()")
    }

    fn table_exists_sql(&self, table: &TableName) -> String {
        let name = string_literal(&table.name);
        format!(
            "SELECT COUNT(*) FROM (SELECT name FROM sqlite_master WHERE type = 'table' AND name = {} \
             UNION ALL SELECT name FROM sqlite_temp_master WHERE type = 'table' AND name = {}){}",
            name,
            name,
            self.statement_terminator()
        )
    }

    fn truncate_table_sql(&self, table: &TableName) -> String {
        format!("DELETE FROM {}{}", self.delimit_table(table), self.statement_terminator())
    }
}
