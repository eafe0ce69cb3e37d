//! Query translation over staged data: staging-table references, row-count returning deletes
//! and table hints, layered in front of plain SELECT printing.

mod bulk_delete;
mod staging_reference;
mod table_hints;
mod translator;

use std::fmt;

use sqlparser::{ast::Statement, dialect::GenericDialect, parser::Parser};

pub use bulk_delete::BulkDeleteRewriter;
pub use staging_reference::{StagingTableReference, StagingTableRewriter};
pub use table_hints::{TableHint, TableHintRewriter};
pub use translator::{QueryRewriter, QueryTranslator, TranslatedQuery};

use crate::bulk::BulkError;

/// A query as handed to the translator.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    Select(Box<sqlparser::ast::Query>),
    /// Every row of a staging table.
    StagingTable(StagingTableReference),
    /// Deletes the rows `source` selects and reports how many went.
    BulkDelete(Box<QueryNode>),
    TableHints {
        source: Box<QueryNode>,
        hints: Vec<TableHint>,
    },
}

impl QueryNode {
    /// Parses a single `SELECT`. Identifiers follow ANSI double-quote delimiting.
    pub fn parse(sql: &str) -> Result<Self, BulkError> {
        let mut statements = Parser::parse_sql(&GenericDialect {}, sql)
            .map_err(|e| BulkError::InvalidArgument(format!("Could not parse query: {}", e)))?;

        if statements.len() != 1 {
            return Err(BulkError::InvalidArgument(format!(
                "Expected exactly one query, found {} statements",
                statements.len()
            )));
        }

        match statements.remove(0) {
            Statement::Query(query) => Ok(QueryNode::Select(query)),
            other => Err(BulkError::InvalidArgument(format!("'{}' is not a query", other))),
        }
    }

    pub fn bulk_delete(self) -> QueryNode {
        QueryNode::BulkDelete(Box::new(self))
    }

    /// Hints land on the tables of the source query. On a bulk delete they go to the deleted
    /// table.
    pub fn with_table_hints(self, hints: impl IntoIterator<Item = TableHint>) -> QueryNode {
        match self {
            QueryNode::BulkDelete(source) => QueryNode::BulkDelete(Box::new(source.with_table_hints(hints))),
            QueryNode::TableHints { source, hints: mut existing } => {
                existing.extend(hints);
                QueryNode::TableHints { source, hints: existing }
            }
            source => QueryNode::TableHints { source: Box::new(source), hints: hints.into_iter().collect() },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            QueryNode::Select(_) => "a query",
            QueryNode::StagingTable(_) => "a staging table",
            QueryNode::BulkDelete(_) => "a bulk delete",
            QueryNode::TableHints { .. } => "a hinted query",
        }
    }
}

impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Select(query) => write!(f, "{}", query),
            QueryNode::StagingTable(reference) => write!(f, "staging {} AS {}", reference.table, reference.alias),
            QueryNode::BulkDelete(source) => write!(f, "bulk delete of ({})", source),
            QueryNode::TableHints { source, hints } => {
                let hints = hints.iter().map(|h| h.to_string()).collect::<Vec<_>>();
                write!(f, "({}) with hints {}", source, hints.join(", "))
            }
        }
    }
}
