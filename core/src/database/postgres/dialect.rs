use crate::{
    bulk::BulkError,
    database::{
        common_sql::generate::{
            ensure_columns, generate_columns_names_sql, generate_prefixed_columns_names_sql,
        },
        dialect::{delimit_with, string_literal, DialectCapabilities, SOURCE_ALIAS},
        SqlDialect,
    },
    metadata::{PropertyPath, StoreType, TableName},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn capabilities(&self) -> DialectCapabilities {
        DialectCapabilities {
            native_bulk_copy: true,
            per_row_update: false,
            table_hints: false,
            null_assigns_identity: false,
        }
    }

    fn identifier_quote(&self) -> char {
        '"'
    }

    fn delimit_identifier(&self, identifier: &str) -> String {
        delimit_with(identifier, '"', '"')
    }

    fn parameter(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn column_type(&self, store_type: StoreType) -> &'static str {
        match store_type {
            StoreType::Bool => "BOOLEAN",
            StoreType::SmallInt => "SMALLINT",
            StoreType::Integer => "INTEGER",
            StoreType::BigInt => "BIGINT",
            StoreType::Double => "DOUBLE PRECISION",
            StoreType::Numeric => "NUMERIC",
            StoreType::Text => "TEXT",
            StoreType::Bytes => "BYTEA",
            StoreType::Uuid => "UUID",
            StoreType::Timestamp => "TIMESTAMPTZ",
            StoreType::Json => "JSONB",
        }
    }

    fn row_count_query(&self) -> Option<&'static str> {
        None
    }

    fn table_exists_sql(&self, table: &TableName) -> String {
        format!(
            "SELECT CASE WHEN to_regclass({}) IS NULL THEN 0 ELSE 1 END{}",
            string_literal(&self.delimit_table(table)),
            self.statement_terminator()
        )
    }

    fn copy_statement(&self, table: &TableName, columns: &[PropertyPath]) -> Option<String> {
        Some(format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT binary)",
            self.delimit_table(table),
            generate_columns_names_sql(self, columns),
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

        // ON CONFLICT needs the conflict target among the inserted columns, store generated
        // keys fall back to update-then-insert.
        if !key_columns.iter().all(|k| insert_columns.contains(k)) {
            let mut statements = Vec::with_capacity(2);
            if !update_columns.is_empty() {
                statements.push(self.update_from_staging_sql(
                    target,
                    staging,
                    update_columns,
                    key_columns,
                )?);
            }
            statements.push(self.insert_unmatched_from_staging_sql(
                target,
                staging,
                insert_columns,
                key_columns,
            )?);
            return Ok(statements);
        }

        let conflict_action = if update_columns.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!(
                "DO UPDATE SET {}",
                update_columns
                    .iter()
                    .map(|c| {
                        let column = self.delimit_identifier(c.column_name());
                        format!("{} = EXCLUDED.{}", column, column)
                    })
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };

        Ok(vec![format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS {} ON CONFLICT ({}) {}{}",
            self.delimit_table(target),
            generate_columns_names_sql(self, insert_columns),
            generate_prefixed_columns_names_sql(self, SOURCE_ALIAS, insert_columns),
            self.delimit_table(staging),
            self.delimit_identifier(SOURCE_ALIAS),
            generate_columns_names_sql(self, key_columns),
            conflict_action,
            self.statement_terminator()
        )])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metadata::{EntityModel, PropertyDescriptor};

    fn columns() -> Vec<PropertyPath> {
        let entity = EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Id", StoreType::BigInt).required())
            .property(PropertyDescriptor::new("Name", StoreType::Text))
            .build();
        entity.properties().iter().map(|p| PropertyPath::own(Arc::clone(p))).collect()
    }

    #[test]
    fn test_copy_statement() {
        let columns = columns();
        let sql = PostgresDialect
            .copy_statement(&TableName::with_schema("sales", "Customer"), &columns)
            .unwrap();

        assert_eq!(
            sql,
            "COPY \"sales\".\"Customer\" (\"Id\", \"Name\") FROM STDIN WITH (FORMAT binary)"
        );
    }

    #[test]
    fn test_update_from_staging() {
        let columns = columns();
        let sql = PostgresDialect
            .update_from_staging_sql(
                &TableName::new("Customer"),
                &TableName::new("stage"),
                &columns[1..],
                &columns[..1],
            )
            .unwrap();

        assert_eq!(
            sql,
            "UPDATE \"Customer\" AS \"d\" SET \"Name\" = \"s\".\"Name\" FROM \"stage\" AS \"s\" \
             WHERE \"d\".\"Id\" = \"s\".\"Id\";"
        );
    }

    #[test]
    fn test_upsert_uses_on_conflict_when_keys_are_inserted() {
        let columns = columns();
        let statements = PostgresDialect
            .upsert_from_staging_sql(
                &TableName::new("Customer"),
                &TableName::new("stage"),
                &columns,
                &columns[1..],
                &columns[..1],
            )
            .unwrap();

        assert_eq!(
            statements,
            vec!["INSERT INTO \"Customer\" (\"Id\", \"Name\") SELECT \"s\".\"Id\", \"s\".\"Name\" \
                  FROM \"stage\" AS \"s\" ON CONFLICT (\"Id\") DO UPDATE SET \"Name\" = EXCLUDED.\"Name\";"
                .to_string()]
        );
    }

    #[test]
    fn test_upsert_without_inserted_keys_updates_then_inserts() {
        let columns = columns();
        let statements = PostgresDialect
            .upsert_from_staging_sql(
                &TableName::new("Customer"),
                &TableName::new("stage"),
                &columns[1..],
                &columns[1..],
                &columns[..1],
            )
            .unwrap();

        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPDATE \"Customer\" AS \"d\""));
        assert!(statements[1].contains("WHERE NOT EXISTS"));
    }

    #[test]
    fn test_create_temp_table() {
        let columns = columns();
        let sql = PostgresDialect.create_temp_table_sql(&TableName::new("stage"), &columns, &columns[..1]);

        assert_eq!(
            sql,
            "CREATE TEMPORARY TABLE \"stage\" (\"Id\" BIGINT NOT NULL, \"Name\" TEXT NULL, PRIMARY KEY (\"Id\"));"
        );
    }

    #[test]
    fn test_table_exists_sql_quotes_literal() {
        assert_eq!(
            PostgresDialect.table_exists_sql(&TableName::new("stage")),
            "SELECT CASE WHEN to_regclass('\"stage\"') IS NULL THEN 0 ELSE 1 END;"
        );
    }
}
