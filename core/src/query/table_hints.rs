use std::fmt;

use serde::Deserialize;
use sqlparser::ast::{Expr, Ident, SetExpr, TableFactor};

use crate::{
    bulk::BulkError,
    query::{QueryNode, QueryRewriter, QueryTranslator, TranslatedQuery},
};

/// Locking and access-path hints attached to a table reference (`WITH (NOLOCK)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableHint {
    NoLock,
    ReadPast,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    UpdLock,
    XLock,
    HoldLock,
    RowLock,
    PagLock,
    TabLock,
    TabLockX,
    NoWait,
    ForceScan,
    ForceSeek,
    Index(String),
}

impl fmt::Display for TableHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            TableHint::NoLock => "NOLOCK",
            TableHint::ReadPast => "READPAST",
            TableHint::ReadCommitted => "READCOMMITTED",
            TableHint::RepeatableRead => "REPEATABLEREAD",
            TableHint::Serializable => "SERIALIZABLE",
            TableHint::UpdLock => "UPDLOCK",
            TableHint::XLock => "XLOCK",
            TableHint::HoldLock => "HOLDLOCK",
            TableHint::RowLock => "ROWLOCK",
            TableHint::PagLock => "PAGLOCK",
            TableHint::TabLock => "TABLOCK",
            TableHint::TabLockX => "TABLOCKX",
            TableHint::NoWait => "NOWAIT",
            TableHint::ForceScan => "FORCESCAN",
            TableHint::ForceSeek => "FORCESEEK",
            TableHint::Index(index) => return write!(f, "INDEX({})", index),
        };
        f.write_str(keyword)
    }
}

/// Threads hints onto every table of the hinted query's FROM clause, joins included.
pub struct TableHintRewriter;

impl QueryRewriter for TableHintRewriter {
    fn try_rewrite(
        &self,
        node: &QueryNode,
        translator: &QueryTranslator,
    ) -> Result<Option<TranslatedQuery>, BulkError> {
        let QueryNode::TableHints { source, hints } = node else {
            return Ok(None);
        };
        translator.ensure_hints_supported(hints)?;

        let mut query = translator.resolve_query(source)?;
        let SetExpr::Select(select) = query.body.as_mut() else {
            return Err(BulkError::NotSupportedOperation(
                "Table hints can only be applied to a single SELECT".to_string(),
            ));
        };

        for table in select.from.iter_mut() {
            apply_hints(&mut table.relation, hints);
            for join in table.joins.iter_mut() {
                apply_hints(&mut join.relation, hints);
            }
        }

        Ok(Some(TranslatedQuery::rows(translator.print(&query))))
    }
}

fn apply_hints(relation: &mut TableFactor, hints: &[TableHint]) {
    if let TableFactor::Table { with_hints, .. } = relation {
        with_hints.extend(hints.iter().map(|hint| Expr::Identifier(Ident::new(hint.to_string()))));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        database::{postgres::PostgresDialect, sqlserver::SqlServerDialect},
        metadata::TableName,
        query::StagingTableReference,
    };

    #[test]
    fn test_hint_keywords() {
        assert_eq!(TableHint::RowLock.to_string(), "ROWLOCK");
        assert_eq!(TableHint::TabLockX.to_string(), "TABLOCKX");
        assert_eq!(TableHint::Index("IX_Name".to_string()).to_string(), "INDEX(IX_Name)");
    }

    #[test]
    fn test_hints_are_applied_to_every_table() {
        let translator = QueryTranslator::new(Arc::new(SqlServerDialect));
        let node = QueryNode::parse("SELECT * FROM orders JOIN customers ON orders.cid = customers.id")
            .unwrap()
            .with_table_hints([TableHint::NoLock, TableHint::ReadPast]);

        let translated = translator.translate(&node).unwrap();
        assert_eq!(
            translated.sql,
            "SELECT * FROM orders WITH (NOLOCK, READPAST) JOIN customers WITH (NOLOCK, READPAST) \
             ON orders.cid = customers.id;"
        );
    }

    #[test]
    fn test_hints_on_a_staging_table() {
        let translator = QueryTranslator::new(Arc::new(SqlServerDialect));
        let node = QueryNode::StagingTable(StagingTableReference {
            table: TableName::new("#bulk_stage_order_x1"),
            alias: "staged".to_string(),
        })
        .with_table_hints([TableHint::TabLock]);

        let translated = translator.translate(&node).unwrap();
        assert_eq!(translated.sql, "SELECT * FROM [#bulk_stage_order_x1] AS [staged] WITH (TABLOCK);");
    }

    #[test]
    fn test_hints_need_dialect_support() {
        let translator = QueryTranslator::new(Arc::new(PostgresDialect));
        let node = QueryNode::parse("SELECT * FROM orders").unwrap().with_table_hints([TableHint::NoLock]);

        let error = translator.translate(&node).unwrap_err();
        assert!(matches!(error, BulkError::NotSupportedOperation(_)));
    }

    #[test]
    fn test_hint_from_configuration() {
        let hints: Vec<TableHint> = serde_yaml::from_str("- no_lock\n- index: IX_Orders_Date\n").unwrap();
        assert_eq!(hints, vec![TableHint::NoLock, TableHint::Index("IX_Orders_Date".to_string())]);
    }
}
