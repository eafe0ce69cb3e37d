use std::fmt;

use crate::{
    bulk::BulkError,
    database::common_sql::generate::{
        ensure_columns, generate_assignments_sql, generate_column_definitions_sql,
        generate_columns_names_sql, generate_key_predicate_sql, generate_placeholders_sql,
        generate_prefixed_columns_names_sql,
    },
    metadata::{PropertyPath, StoreType, TableName},
    query::TableHint,
};

#[derive(Debug, Clone, Copy)]
pub struct DialectCapabilities {
    /// A native bulk channel (`COPY` and friends) is available on the connection.
    pub native_bulk_copy: bool,
    /// Updates run as one keyed statement per row rather than from a staging table.
    pub per_row_update: bool,
    pub table_hints: bool,
    /// Inserting `NULL` into an auto-increment column makes the store generate a value.
    pub null_assigns_identity: bool,
}

/// A generated statement together with the columns its parameters bind, in binding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkStatement {
    pub sql: String,
    pub parameters: Vec<String>,
}

pub const TARGET_ALIAS: &str = "d";
pub const SOURCE_ALIAS: &str = "s";

/// Everything that differs between SQL flavours: identifier delimiting, parameter markers,
/// type names, temporary tables and the shape of the set-based statements.
///
/// The default statement bodies are ANSI-ish and shared by the SQLite and Postgres dialects.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> DialectCapabilities;

    /// Opening delimiter character, as understood by the query AST printer.
    fn identifier_quote(&self) -> char;

    fn delimit_identifier(&self, identifier: &str) -> String;

    fn delimit_table(&self, table: &TableName) -> String {
        match &table.schema {
            Some(schema) => {
                format!("{}.{}", self.delimit_identifier(schema), self.delimit_identifier(&table.name))
            }
            None => self.delimit_identifier(&table.name),
        }
    }

    fn statement_terminator(&self) -> &'static str {
        ";"
    }

    /// Marker for the 1-based parameter `position`.
    fn parameter(&self, position: usize) -> String;

    fn column_type(&self, store_type: StoreType) -> &'static str;

    /// Physical name for a staging table called `name`.
    fn temp_table_name(&self, name: &str) -> TableName {
        TableName::new(name)
    }

    fn create_temp_table_keyword(&self) -> &'static str {
        "CREATE TEMPORARY TABLE"
    }

    /// Query returning the number of rows touched by the previous statement, for dialects that
    /// cannot report it through the driver.
    fn row_count_query(&self) -> Option<&'static str>;

    /// Query returning a single integer, non-zero when `table` exists.
    fn table_exists_sql(&self, table: &TableName) -> String;

    fn truncate_table_sql(&self, table: &TableName) -> String {
        format!("TRUNCATE TABLE {}{}", self.delimit_table(table), self.statement_terminator())
    }

    fn drop_table_sql(&self, table: &TableName) -> String {
        format!("DROP TABLE IF EXISTS {}{}", self.delimit_table(table), self.statement_terminator())
    }

    fn create_temp_table_sql(
        &self,
        table: &TableName,
        columns: &[PropertyPath],
        primary_key: &[PropertyPath],
    ) -> String {
        let mut definitions = generate_column_definitions_sql(self, columns, primary_key);
        if !primary_key.is_empty() {
            definitions.push(format!("PRIMARY KEY ({})", generate_columns_names_sql(self, primary_key)));
        }

        format!(
            "{} {} ({}){}",
            self.create_temp_table_keyword(),
            self.delimit_table(table),
            definitions.join(", "),
            self.statement_terminator()
        )
    }

    /// Statement for the native bulk channel, if the dialect has one.
    fn copy_statement(&self, _table: &TableName, _columns: &[PropertyPath]) -> Option<String> {
        None
    }

    fn insert_statement(
        &self,
        table: &TableName,
        columns: &[PropertyPath],
    ) -> Result<BulkStatement, BulkError> {
        ensure_columns("insert", table, columns)?;

        Ok(BulkStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}){}",
                self.delimit_table(table),
                generate_columns_names_sql(self, columns),
                generate_placeholders_sql(self, 1, columns.len()),
                self.statement_terminator()
            ),
            parameters: columns.iter().map(|c| c.column_name().to_string()).collect(),
        })
    }

    /// Keyed single-row update. Set columns bind first, key columns after them.
    fn update_statement(
        &self,
        table: &TableName,
        set_columns: &[PropertyPath],
        key_columns: &[PropertyPath],
    ) -> Result<BulkStatement, BulkError> {
        ensure_columns("update", table, set_columns)?;
        ensure_columns("match rows of", table, key_columns)?;

        let assignments = set_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.delimit_identifier(c.column_name()), self.parameter(i + 1)))
            .collect::<Vec<_>>()
            .join(", ");
        let predicate = key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{} = {}",
                    self.delimit_identifier(c.column_name()),
                    self.parameter(set_columns.len() + i + 1)
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        Ok(BulkStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE {}{}",
                self.delimit_table(table),
                assignments,
                predicate,
                self.statement_terminator()
            ),
            parameters: set_columns
                .iter()
                .chain(key_columns.iter())
                .map(|c| c.column_name().to_string())
                .collect(),
        })
    }

    fn update_from_staging_sql(
        &self,
        target: &TableName,
        staging: &TableName,
        set_columns: &[PropertyPath],
        key_columns: &[PropertyPath],
    ) -> Result<String, BulkError> {
        ensure_columns("update", target, set_columns)?;
        ensure_columns("match rows of", target, key_columns)?;

        Ok(format!(
            "UPDATE {} AS {} SET {} FROM {} AS {} WHERE {}{}",
            self.delimit_table(target),
            self.delimit_identifier(TARGET_ALIAS),
            generate_assignments_sql(self, None, SOURCE_ALIAS, set_columns),
            self.delimit_table(staging),
            self.delimit_identifier(SOURCE_ALIAS),
            generate_key_predicate_sql(self, TARGET_ALIAS, SOURCE_ALIAS, key_columns),
            self.statement_terminator()
        ))
    }

    fn insert_unmatched_from_staging_sql(
        &self,
        target: &TableName,
        staging: &TableName,
        insert_columns: &[PropertyPath],
        key_columns: &[PropertyPath],
    ) -> Result<String, BulkError> {
        ensure_columns("insert", target, insert_columns)?;
        ensure_columns("match rows of", target, key_columns)?;

        Ok(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS {} WHERE NOT EXISTS (SELECT 1 FROM {} AS {} WHERE {}){}",
            self.delimit_table(target),
            generate_columns_names_sql(self, insert_columns),
            generate_prefixed_columns_names_sql(self, SOURCE_ALIAS, insert_columns),
            self.delimit_table(staging),
            self.delimit_identifier(SOURCE_ALIAS),
            self.delimit_table(target),
            self.delimit_identifier(TARGET_ALIAS),
            generate_key_predicate_sql(self, TARGET_ALIAS, SOURCE_ALIAS, key_columns),
            self.statement_terminator()
        ))
    }

    /// Statements that apply a filled staging table to `target`, run in order. Their affected
    /// row counts add up to the number of rows inserted plus rows updated.
    fn upsert_from_staging_sql(
        &self,
        target: &TableName,
        staging: &TableName,
        insert_columns: &[PropertyPath],
        update_columns: &[PropertyPath],
        key_columns: &[PropertyPath],
    ) -> Result<Vec<String>, BulkError> {
        let mut statements = Vec::with_capacity(2);
        if !update_columns.is_empty() {
            statements.push(self.update_from_staging_sql(target, staging, update_columns, key_columns)?);
        }
        statements.push(self.insert_unmatched_from_staging_sql(
            target,
            staging,
            insert_columns,
            key_columns,
        )?);
        Ok(statements)
    }

    /// `table_sql` is already delimited. Hints are only passed to dialects that support them.
    fn delete_sql(
        &self,
        table_sql: &str,
        alias: Option<&str>,
        _hints: &[TableHint],
        predicate: Option<&str>,
    ) -> String {
        let mut sql = format!("DELETE FROM {}", table_sql);
        if let Some(alias) = alias {
            sql.push_str(&format!(" AS {}", self.delimit_identifier(alias)));
        }
        if let Some(predicate) = predicate {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        sql.push_str(self.statement_terminator());
        sql
    }
}

/// Doubles every occurrence of `close` inside `identifier` and wraps it in `open`/`close`.
pub(crate) fn delimit_with(identifier: &str, open: char, close: char) -> String {
    let escaped = identifier.replace(close, &format!("{}{}", close, close));
    format!("{}{}{}", open, escaped, close)
}

/// Single-quoted SQL string literal.
pub(crate) fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimit_with_doubles_closing_delimiter() {
        assert_eq!(delimit_with("Order", '"', '"'), "\"Order\"");
        assert_eq!(delimit_with("a\"b", '"', '"'), "\"a\"\"b\"");
        assert_eq!(delimit_with("a]b", '[', ']'), "[a]]b]");
    }

    #[test]
    fn test_string_literal() {
        assert_eq!(string_literal("O'Brien"), "'O''Brien'");
    }
}
