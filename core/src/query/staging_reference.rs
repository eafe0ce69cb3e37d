use crate::{
    bulk::BulkError,
    metadata::TableName,
    query::{QueryNode, QueryRewriter, QueryTranslator, TranslatedQuery},
};

/// A staging table as a query source, read under `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingTableReference {
    pub table: TableName,
    pub alias: String,
}

pub struct StagingTableRewriter;

impl QueryRewriter for StagingTableRewriter {
    fn try_rewrite(
        &self,
        node: &QueryNode,
        translator: &QueryTranslator,
    ) -> Result<Option<TranslatedQuery>, BulkError> {
        if !matches!(node, QueryNode::StagingTable(_)) {
            return Ok(None);
        }

        let query = translator.resolve_query(node)?;
        Ok(Some(TranslatedQuery::rows(translator.print(&query))))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::database::{postgres::PostgresDialect, sqlserver::SqlServerDialect};

    #[test]
    fn test_staging_table_is_read_under_its_alias() {
        let reference = StagingTableReference {
            table: TableName::new("bulk_stage_order_x1"),
            alias: "staged".to_string(),
        };
        let node = QueryNode::StagingTable(reference);

        let postgres = QueryTranslator::new(Arc::new(PostgresDialect)).translate(&node).unwrap();
        assert_eq!(postgres.sql, "SELECT * FROM \"bulk_stage_order_x1\" AS \"staged\";");

        let sql_server = QueryTranslator::new(Arc::new(SqlServerDialect)).translate(&node).unwrap();
        assert_eq!(sql_server.sql, "SELECT * FROM [bulk_stage_order_x1] AS [staged];");
    }

    #[test]
    fn test_other_nodes_pass_through() {
        let translator = QueryTranslator::new(Arc::new(PostgresDialect));
        let node = QueryNode::parse("SELECT 1").unwrap();

        assert_eq!(StagingTableRewriter.try_rewrite(&node, &translator).unwrap(), None);
    }
}
