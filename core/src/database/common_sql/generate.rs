use crate::{
    bulk::BulkError,
    database::SqlDialect,
    helpers::camel_to_snake,
    metadata::{PropertyPath, TableName},
};

pub fn generate_staging_table_name(prefix: &str, entity_name: &str, suffix: &str) -> String {
    format!("{}_{}_{}", prefix, camel_to_snake(entity_name), suffix.to_lowercase())
}

pub fn generate_columns_names_sql<D: SqlDialect + ?Sized>(
    dialect: &D,
    columns: &[PropertyPath],
) -> String {
    columns
        .iter()
        .map(|c| dialect.delimit_identifier(c.column_name()))
        .collect::<Vec<String>>()
        .join(", ")
}

pub fn generate_prefixed_columns_names_sql<D: SqlDialect + ?Sized>(
    dialect: &D,
    alias: &str,
    columns: &[PropertyPath],
) -> String {
    columns
        .iter()
        .map(|c| {
            format!("{}.{}", dialect.delimit_identifier(alias), dialect.delimit_identifier(c.column_name()))
        })
        .collect::<Vec<String>>()
        .join(", ")
}

pub fn generate_placeholders_sql<D: SqlDialect + ?Sized>(
    dialect: &D,
    first: usize,
    count: usize,
) -> String {
    (first..first + count).map(|i| dialect.parameter(i)).collect::<Vec<String>>().join(", ")
}

/// `<target>.c = <source>.c, ...`; with no target alias the assigned column is left bare.
pub fn generate_assignments_sql<D: SqlDialect + ?Sized>(
    dialect: &D,
    target_alias: Option<&str>,
    source_alias: &str,
    columns: &[PropertyPath],
) -> String {
    columns
        .iter()
        .map(|c| {
            let column = dialect.delimit_identifier(c.column_name());
            let target = match target_alias {
                Some(alias) => format!("{}.{}", dialect.delimit_identifier(alias), column),
                None => column.clone(),
            };
            format!("{} = {}.{}", target, dialect.delimit_identifier(source_alias), column)
        })
        .collect::<Vec<String>>()
        .join(", ")
}

pub fn generate_key_predicate_sql<D: SqlDialect + ?Sized>(
    dialect: &D,
    left_alias: &str,
    right_alias: &str,
    keys: &[PropertyPath],
) -> String {
    keys.iter()
        .map(|k| {
            let column = dialect.delimit_identifier(k.column_name());
            format!(
                "{}.{} = {}.{}",
                dialect.delimit_identifier(left_alias),
                column,
                dialect.delimit_identifier(right_alias),
                column
            )
        })
        .collect::<Vec<String>>()
        .join(" AND ")
}

/// Staging column definitions: key columns are `NOT NULL`, everything else nullable.
pub fn generate_column_definitions_sql<D: SqlDialect + ?Sized>(
    dialect: &D,
    columns: &[PropertyPath],
    primary_key: &[PropertyPath],
) -> Vec<String> {
    columns
        .iter()
        .map(|c| {
            let nullability = if primary_key.contains(c) { "NOT NULL" } else { "NULL" };
            format!(
                "{} {} {}",
                dialect.delimit_identifier(c.column_name()),
                dialect.column_type(c.property().store_type()),
                nullability
            )
        })
        .collect()
}

pub fn ensure_columns(
    operation: &str,
    table: &TableName,
    columns: &[PropertyPath],
) -> Result<(), BulkError> {
    if columns.is_empty() {
        return Err(BulkError::NotSupportedOperation(format!(
            "Cannot {} table {} without any columns",
            operation, table
        )));
    }
    Ok(())
}
