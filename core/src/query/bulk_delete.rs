use sqlparser::ast::{GroupByExpr, ObjectNamePart, Query, SetExpr, TableFactor};

use crate::{
    bulk::BulkError,
    database::SqlDialect,
    metadata::TableName,
    query::{QueryNode, QueryRewriter, QueryTranslator, TableHint, TranslatedQuery},
};

/// Turns "the rows of this single-table query" into a `DELETE` plus a row-count read.
pub struct BulkDeleteRewriter;

impl QueryRewriter for BulkDeleteRewriter {
    fn try_rewrite(
        &self,
        node: &QueryNode,
        translator: &QueryTranslator,
    ) -> Result<Option<TranslatedQuery>, BulkError> {
        let QueryNode::BulkDelete(source) = node else {
            return Ok(None);
        };

        let (source, hints): (&QueryNode, &[TableHint]) = match source.as_ref() {
            QueryNode::TableHints { source, hints } => (source.as_ref(), hints),
            other => (other, &[]),
        };
        translator.ensure_hints_supported(hints)?;

        let query = translator.resolve_query(source)?;
        let dialect = translator.dialect();
        let target = DeleteTarget::from_query(&query, dialect)?;

        Ok(Some(TranslatedQuery {
            sql: dialect.delete_sql(&target.table_sql, target.alias.as_deref(), hints, target.predicate.as_deref()),
            row_count_sql: dialect
                .row_count_query()
                .map(|query| format!("{}{}", query, dialect.statement_terminator())),
            returns_row_count: true,
            table: Some(target.table),
        }))
    }
}

struct DeleteTarget {
    table: TableName,
    table_sql: String,
    alias: Option<String>,
    predicate: Option<String>,
}

impl DeleteTarget {
    fn from_query(query: &Query, dialect: &dyn SqlDialect) -> Result<Self, BulkError> {
        if query.with.is_some() {
            return Err(unsupported("a WITH clause"));
        }
        if query.limit_clause.is_some() || query.fetch.is_some() {
            return Err(unsupported("LIMIT, OFFSET or FETCH"));
        }

        let SetExpr::Select(select) = query.body.as_ref() else {
            return Err(unsupported("a set operation"));
        };
        if select.distinct.is_some() {
            return Err(unsupported("DISTINCT"));
        }
        if select.top.is_some() {
            return Err(unsupported("TOP"));
        }
        let grouped = match &select.group_by {
            GroupByExpr::All(_) => true,
            GroupByExpr::Expressions(expressions, _) => !expressions.is_empty(),
        };
        if grouped {
            return Err(unsupported("GROUP BY"));
        }
        if select.having.is_some() {
            return Err(unsupported("HAVING"));
        }

        let table = match select.from.as_slice() {
            [] => {
                return Err(BulkError::NotSupportedOperation(
                    "A bulk delete needs a table to delete from".to_string(),
                ))
            }
            [table] if table.joins.is_empty() => table,
            _ => {
                return Err(BulkError::NotSupportedOperation(
                    "A bulk delete can only target a single table".to_string(),
                ))
            }
        };

        let TableFactor::Table { name, alias, .. } = &table.relation else {
            return Err(BulkError::NotSupportedOperation(format!(
                "Cannot delete from '{}', it is not a table",
                table.relation
            )));
        };

        let identifiers: Vec<&str> =
            name.0.iter().filter_map(|part| part.as_ident()).map(|ident| ident.value.as_str()).collect();
        let table = match identifiers.as_slice() {
            [.., schema, table] => TableName::with_schema(*schema, *table),
            [table] => TableName::new(*table),
            [] => TableName::new(name.to_string()),
        };

        let table_sql = name
            .0
            .iter()
            .map(|part| match part {
                ObjectNamePart::Identifier(ident) => dialect.delimit_identifier(&ident.value),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");

        Ok(DeleteTarget {
            table,
            table_sql,
            alias: alias.as_ref().map(|alias| alias.name.value.clone()),
            predicate: select.selection.as_ref().map(|predicate| predicate.to_string()),
        })
    }
}

fn unsupported(clause: &str) -> BulkError {
    BulkError::NotSupportedOperation(format!("A bulk delete cannot be built from a query with {}", clause))
}
