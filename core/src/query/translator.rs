use std::{ops::ControlFlow, sync::Arc};

use sqlparser::ast::{
    visit_relations_mut, Ident, ObjectName, ObjectNamePart, Query, TableAlias, TableFactor, VisitMut,
    VisitorMut,
};
use tracing::debug;

use crate::{
    bulk::BulkError,
    database::SqlDialect,
    metadata::TableName,
    query::{
        BulkDeleteRewriter, QueryNode, StagingTableReference, StagingTableRewriter, TableHint,
        TableHintRewriter,
    },
};

/// Dialect SQL for one [`QueryNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedQuery {
    pub sql: String,
    /// Read right after `sql` when the driver cannot report the affected row count itself.
    pub row_count_sql: Option<String>,
    pub returns_row_count: bool,
    /// The table a writing statement targets.
    pub table: Option<TableName>,
}

impl TranslatedQuery {
    pub(crate) fn rows(sql: String) -> Self {
        TranslatedQuery { sql, row_count_sql: None, returns_row_count: false, table: None }
    }
}

/// One link of the translation chain. Returns `None` to pass the node on unchanged.
pub trait QueryRewriter: Send + Sync {
    fn try_rewrite(
        &self,
        node: &QueryNode,
        translator: &QueryTranslator,
    ) -> Result<Option<TranslatedQuery>, BulkError>;
}

/// Runs a node through an ordered chain of rewriters; the first one that handles it wins and
/// plain queries fall through to printing.
pub struct QueryTranslator {
    dialect: Arc<dyn SqlDialect>,
    rewriters: Vec<Box<dyn QueryRewriter>>,
    staging_tables: Vec<StagingTableReference>,
}

impl QueryTranslator {
    pub fn new(dialect: Arc<dyn SqlDialect>) -> Self {
        QueryTranslator {
            dialect,
            rewriters: vec![
                Box::new(BulkDeleteRewriter),
                Box::new(TableHintRewriter),
                Box::new(StagingTableRewriter),
            ],
            staging_tables: Vec::new(),
        }
    }

    /// Puts `rewriter` in front of the chain.
    pub fn with_rewriter(mut self, rewriter: Box<dyn QueryRewriter>) -> Self {
        self.rewriters.insert(0, rewriter);
        self
    }

    /// Table references named like `reference.alias` now read from the staging table.
    pub fn bind_staging_table(mut self, reference: StagingTableReference) -> Self {
        self.staging_tables.push(reference);
        self
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn translate(&self, node: &QueryNode) -> Result<TranslatedQuery, BulkError> {
        for rewriter in &self.rewriters {
            if let Some(translated) = rewriter.try_rewrite(node, self)? {
                debug!("Translated {} to {}", node, translated.sql);
                return Ok(translated);
            }
        }

        let query = self.resolve_query(node)?;
        Ok(TranslatedQuery::rows(self.print(&query)))
    }

    /// The SELECT a node reads, with staging-table references swapped in.
    pub(crate) fn resolve_query(&self, node: &QueryNode) -> Result<Query, BulkError> {
        match node {
            QueryNode::Select(query) => Ok(self.bind_references(query.as_ref().clone(), &[])),
            QueryNode::StagingTable(reference) => {
                let mut query = parse_query("SELECT * FROM staging")?;
                let alias = Ident::with_quote(self.dialect.identifier_quote(), reference.alias.clone());
                let _ = visit_relations_mut(&mut query, |name| {
                    *name = ObjectName(vec![ObjectNamePart::Identifier(alias.clone())]);
                    ControlFlow::<()>::Continue(())
                });
                Ok(self.bind_references(query, std::slice::from_ref(reference)))
            }
            other => Err(BulkError::NotSupportedOperation(format!(
                "{} cannot be used as the source of another query",
                other.kind()
            ))),
        }
    }

    pub(crate) fn print(&self, query: &Query) -> String {
        format!("{}{}", query, self.dialect.statement_terminator())
    }

    pub(crate) fn ensure_hints_supported(&self, hints: &[TableHint]) -> Result<(), BulkError> {
        if !hints.is_empty() && !self.dialect.capabilities().table_hints {
            return Err(BulkError::NotSupportedOperation(format!(
                "{} does not support table hints",
                self.dialect.name()
            )));
        }
        Ok(())
    }

    fn bind_references(&self, mut query: Query, extra: &[StagingTableReference]) -> Query {
        let references: Vec<&StagingTableReference> = extra.iter().chain(self.staging_tables.iter()).collect();
        if references.is_empty() {
            return query;
        }

        let mut rewriter = TableReferenceRewriter { quote: self.dialect.identifier_quote(), references };
        let _ = query.visit(&mut rewriter);
        query
    }
}

/// Emits `<staging name> AS <alias>` for table factors that name a bound staging table.
struct TableReferenceRewriter<'a> {
    quote: char,
    references: Vec<&'a StagingTableReference>,
}

impl VisitorMut for TableReferenceRewriter<'_> {
    type Break = ();

    fn pre_visit_table_factor(&mut self, table_factor: &mut TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Table { name, alias, .. } = table_factor {
            let reference = match name.0.as_slice() {
                [ObjectNamePart::Identifier(ident)] => {
                    self.references.iter().find(|r| r.alias == ident.value).copied()
                }
                _ => None,
            };

            if let Some(reference) = reference {
                *name = quoted_object_name(self.quote, &reference.table);
                if alias.is_none() {
                    *alias = Some(TableAlias {
                        explicit: true,
                        name: Ident::with_quote(self.quote, reference.alias.clone()),
                        columns: Vec::new(),
                    });
                }
            }
        }
        ControlFlow::Continue(())
    }
}

fn quoted_object_name(quote: char, table: &TableName) -> ObjectName {
    let parts = table
        .schema
        .iter()
        .chain(std::iter::once(&table.name))
        .map(|part| ObjectNamePart::Identifier(Ident::with_quote(quote, part.clone())))
        .collect();
    ObjectName(parts)
}

fn parse_query(sql: &str) -> Result<Query, BulkError> {
    match QueryNode::parse(sql)? {
        QueryNode::Select(query) => Ok(*query),
        other => Err(BulkError::InvalidArgument(format!("'{}' is not a query", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{sqlite::SqliteDialect, sqlserver::SqlServerDialect};

    fn recent() -> StagingTableReference {
        StagingTableReference { table: TableName::new("bulk_stage_customer_ab12"), alias: "recent".to_string() }
    }

    #[test]
    fn test_plain_query_is_printed_with_terminator() {
        let translator = QueryTranslator::new(Arc::new(SqliteDialect));
        let node = QueryNode::parse("SELECT \"Name\" FROM \"Customer\" WHERE \"Id\" = 1").unwrap();

        let translated = translator.translate(&node).unwrap();
        assert_eq!(translated.sql, "SELECT \"Name\" FROM \"Customer\" WHERE \"Id\" = 1;");
        assert!(!translated.returns_row_count);
        assert_eq!(translated.row_count_sql, None);
    }

    #[test]
    fn test_bound_staging_tables_replace_table_references() {
        let translator = QueryTranslator::new(Arc::new(SqliteDialect)).bind_staging_table(recent());
        let node = QueryNode::parse(
            "SELECT c.\"Name\" FROM \"Customer\" AS c WHERE c.\"Id\" IN (SELECT \"Id\" FROM recent)",
        )
        .unwrap();

        let translated = translator.translate(&node).unwrap();
        assert!(translated.sql.contains("FROM \"bulk_stage_customer_ab12\" AS \"recent\")"));
        assert!(translated.sql.contains("FROM \"Customer\" AS c"));
    }

    #[test]
    fn test_staging_table_query_uses_dialect_quoting() {
        let reference = StagingTableReference {
            table: TableName::new("bulk_stage_customer_ab12"),
            alias: "recent \"copy\"".to_string(),
        };
        let translator = QueryTranslator::new(Arc::new(SqlServerDialect));

        let translated = translator.translate(&QueryNode::StagingTable(reference)).unwrap();
        assert!(translated.sql.starts_with("SELECT * FROM [bulk_stage_customer_ab12] AS [recent \"copy\"]"));
        assert!(!translated.sql.contains("\"\""));
    }

    #[test]
    fn test_custom_rewriter_runs_first() {
        struct Fixed;

        impl QueryRewriter for Fixed {
            fn try_rewrite(
                &self,
                node: &QueryNode,
                _translator: &QueryTranslator,
            ) -> Result<Option<TranslatedQuery>, BulkError> {
                Ok(matches!(node, QueryNode::BulkDelete(_)).then(|| TranslatedQuery::rows("SELECT 0;".to_string())))
            }
        }

        let translator = QueryTranslator::new(Arc::new(SqliteDialect)).with_rewriter(Box::new(Fixed));
        let delete = QueryNode::parse("SELECT * FROM t").unwrap().bulk_delete();
        let select = QueryNode::parse("SELECT * FROM t").unwrap();

        assert_eq!(translator.translate(&delete).unwrap().sql, "SELECT 0;");
        assert_eq!(translator.translate(&select).unwrap().sql, "SELECT * FROM t;");
    }

    #[test]
    fn test_bulk_delete_cannot_be_a_source() {
        let translator = QueryTranslator::new(Arc::new(SqlServerDialect));
        let nested = QueryNode::parse("SELECT * FROM t").unwrap().bulk_delete().bulk_delete();

        let error = translator.translate(&nested).unwrap_err();
        assert!(matches!(error, BulkError::NotSupportedOperation(_)));
    }
}
