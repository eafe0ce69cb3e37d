use crate::{
    bulk::BulkError,
    database::{
        common_sql::generate::{
            ensure_columns, generate_assignments_sql, generate_columns_names_sql,
            generate_key_predicate_sql, generate_prefixed_columns_names_sql,
        },
        dialect::{delimit_with, string_literal, DialectCapabilities, SOURCE_ALIAS, TARGET_ALIAS},
        SqlDialect,
    },
    metadata::{PropertyPath, StoreType, TableName},
    query::TableHint,
};

/// SQL Server statement synthesis. There is no driver for it in this crate, so it only
/// produces SQL text for callers that execute it themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    fn hints_sql(&self, hints: &[TableHint]) -> String {
        if hints.is_empty() {
            return String::new();
        }
        format!(" WITH ({})", hints.iter().map(|h| h.to_string()).collect::<Vec<_>>().join(", "))
    }
}

impl SqlDialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            native_bulk_copy: false,
            per_row_update: false,
            table_hints: true,
            null_assigns_identity: false,
        }
    }

    fn identifier_quote(&self) -> char {
        '['
    }

    fn delimit_identifier(&self, identifier: &str) -> String {
        delimit_with(identifier, '[', ']')
    }

    fn parameter(&self, position: usize) -> String {
        format!("@p{}", position)
    }

    fn column_type(&self, store_type: StoreType) -> &'static str {
        match store_type {
            StoreType::Bool => "BIT",
            StoreType::SmallInt => "SMALLINT",
            StoreType::Integer => "INT",
            StoreType::BigInt => "BIGINT",
            StoreType::Double => "FLOAT",
            StoreType::Numeric => "DECIMAL(38, 18)",
            StoreType::Text | StoreType::Json => "NVARCHAR(MAX)",
            StoreType::Bytes => "VARBINARY(MAX)",
            StoreType::Uuid => "UNIQUEIDENTIFIER",
            StoreType::Timestamp => "DATETIMEOFFSET",
        }
    }

    fn temp_table_name(&self, name: &str) -> TableName {
        TableName::new(format!("#{}", name))
    }

    fn create_temp_table_keyword(&self) -> &'static str {
        "CREATE TABLE"
    }

    fn row_count_query(&self) -> Option<&'static str> {
        Some("SELECT @@ROWCOUNT")
    }

    fn table_exists_sql(&self, table: &TableName) -> String {
        let object = if table.name.starts_with('#') {
            format!("tempdb..{}", table.name)
        } else {
            self.delimit_table(table)
        };
        format!(
            "SELECT CASE WHEN OBJECT_ID(N{}) IS NULL THEN 0 ELSE 1 END{}",
            string_literal(&object),
            self.statement_terminator()
        )
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
            "UPDATE {} SET {} FROM {} AS {} INNER JOIN {} AS {} ON {}{}",
            self.delimit_identifier(TARGET_ALIAS),
            generate_assignments_sql(self, Some(TARGET_ALIAS), SOURCE_ALIAS, set_columns),
            self.delimit_table(target),
            self.delimit_identifier(TARGET_ALIAS),
            self.delimit_table(staging),
            self.delimit_identifier(SOURCE_ALIAS),
            generate_key_predicate_sql(self, TARGET_ALIAS, SOURCE_ALIAS, key_columns),
            self.statement_terminator()
        ))
    }

    fn upsert_from_staging_sql(
        &self,
        target: &TableName,
        staging: &TableName,
        insert_columns: &[PropertyPath],
        update_columns: &[PropertyPath],
        key_columns: &[PropertyPath],
    ) -> Result<Vec<String>, BulkError> {
        ensure_columns("insert", target, insert_columns)?;
        ensure_columns("match rows of", target, key_columns)?;

        let mut sql = format!(
            "MERGE INTO {} AS {} USING {} AS {} ON {}",
            self.delimit_table(target),
            self.delimit_identifier(TARGET_ALIAS),
            self.delimit_table(staging),
            self.delimit_identifier(SOURCE_ALIAS),
            generate_key_predicate_sql(self, TARGET_ALIAS, SOURCE_ALIAS, key_columns),
        );
        if !update_columns.is_empty() {
            sql.push_str(&format!(
                " WHEN MATCHED THEN UPDATE SET {}",
                generate_assignments_sql(self, Some(TARGET_ALIAS), SOURCE_ALIAS, update_columns)
            ));
        }
        sql.push_str(&format!(
            " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({}){}",
            generate_columns_names_sql(self, insert_columns),
            generate_prefixed_columns_names_sql(self, SOURCE_ALIAS, insert_columns),
            self.statement_terminator()
        ));

        Ok(vec![sql])
    }

    fn delete_sql(
        &self,
        table_sql: &str,
        alias: Option<&str>,
        hints: &[TableHint],
        predicate: Option<&str>,
    ) -> String {
        let mut sql = match alias {
            Some(alias) => {
                let alias = self.delimit_identifier(alias);
                format!("DELETE {} FROM {} AS {}", alias, table_sql, alias)
            }
            None => format!("DELETE FROM {}", table_sql),
        };
        sql.push_str(&self.hints_sql(hints));
        if let Some(predicate) = predicate {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        sql.push_str(self.statement_terminator());
        sql
    }
}
