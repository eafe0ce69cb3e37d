use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    bulk::{
        context::{BulkInsertContext, BulkUpdateContext, BulkUpsertContext},
        data_reader::RecordIter,
        executor::BulkExecutor,
        AutoIncrementBehavior, BulkError, BulkInsertOptions, BulkUpdateOptions, BulkUpsertOptions,
        PropertyGetterCache, PropertySelector, StagingTable, TempTableInsertOptions, TempTableManager,
    },
    config::BulkSettings,
    database::BulkConnection,
    metadata::EntityMetadata,
    query::{QueryNode, QueryTranslator, StagingTableReference, TranslatedQuery},
    record::Record,
};

/// Entry point for bulk work against one store. Cheap to clone; clones share the getter cache
/// handed to [`BulkOperations::new`].
#[derive(Clone)]
pub struct BulkOperations {
    settings: BulkSettings,
    cache: Arc<PropertyGetterCache>,
    temp_tables: TempTableManager,
}

impl BulkOperations {
    pub fn new(settings: BulkSettings, cache: Arc<PropertyGetterCache>) -> Self {
        let temp_tables = TempTableManager::new(&settings);
        BulkOperations { settings, cache, temp_tables }
    }

    pub fn cache(&self) -> &Arc<PropertyGetterCache> {
        &self.cache
    }

    pub fn settings(&self) -> &BulkSettings {
        &self.settings
    }

    pub fn temp_tables(&self) -> &TempTableManager {
        &self.temp_tables
    }

    /// Inserts every record, then the items of its owned collections. Returns the number of
    /// rows written across all tables.
    pub async fn bulk_insert<'r, C, T, I>(
        &self,
        conn: &mut C,
        entity: &Arc<dyn EntityMetadata>,
        records: I,
        options: &BulkInsertOptions,
    ) -> Result<u64, BulkError>
    where
        C: BulkConnection,
        T: Record + 'r,
        I: IntoIterator<Item = &'r T>,
        I::IntoIter: Send + 'r,
    {
        let context = BulkInsertContext::create(entity, options, conn.dialect().as_ref())?;

        let mut executor = BulkExecutor::new(conn, Arc::clone(&self.cache), options.cancellation.clone());
        let affected = executor.insert(&context, record_iter(records)).await?;

        info!("Bulk inserted {} rows for {}", affected, entity.name());
        Ok(affected)
    }

    /// Updates the rows matching each record's key columns.
    pub async fn bulk_update<'r, C, T, I>(
        &self,
        conn: &mut C,
        entity: &Arc<dyn EntityMetadata>,
        records: I,
        options: &BulkUpdateOptions,
    ) -> Result<u64, BulkError>
    where
        C: BulkConnection,
        T: Record + 'r,
        I: IntoIterator<Item = &'r T>,
        I::IntoIter: Send + 'r,
    {
        let context = BulkUpdateContext::create(entity, options)?;

        let mut executor = BulkExecutor::new(conn, Arc::clone(&self.cache), options.cancellation.clone());
        let affected = executor.update(&context, record_iter(records), &self.temp_tables).await?;

        info!("Bulk updated {} rows of {}", affected, context.table);
        Ok(affected)
    }

    /// Updates matching rows and inserts the rest. The result counts both.
    pub async fn bulk_insert_or_update<'r, C, T, I>(
        &self,
        conn: &mut C,
        entity: &Arc<dyn EntityMetadata>,
        records: I,
        options: &BulkUpsertOptions,
    ) -> Result<u64, BulkError>
    where
        C: BulkConnection,
        T: Record + 'r,
        I: IntoIterator<Item = &'r T>,
        I::IntoIter: Send + 'r,
    {
        let context = BulkUpsertContext::create(entity, options, conn.dialect().as_ref())?;

        let mut executor = BulkExecutor::new(conn, Arc::clone(&self.cache), options.cancellation.clone());
        let affected = executor.upsert(&context, record_iter(records), &self.temp_tables).await?;

        info!("Bulk inserted or updated {} rows of {}", affected, context.table);
        Ok(affected)
    }

    /// Copies the records into a new staging table and hands it back as a queryable source.
    /// The caller owns the table and must [`release`](TempTableQuery::release) it.
    pub async fn bulk_insert_into_temp_table<'r, C, T, I>(
        &self,
        conn: &mut C,
        entity: &Arc<dyn EntityMetadata>,
        records: I,
        options: &TempTableInsertOptions,
    ) -> Result<TempTableQuery, BulkError>
    where
        C: BulkConnection,
        T: Record + 'r,
        I: IntoIterator<Item = &'r T>,
        I::IntoIter: Send + 'r,
    {
        let columns = PropertySelector::new(entity.as_ref())
            .insert_properties(&options.properties, AutoIncrementBehavior::KeepValues)?;
        let table_name = options.temp_table.table_name.as_deref();
        let staging = self
            .temp_tables
            .create(conn, entity.as_ref(), &columns, options.temp_table.primary_key, table_name)
            .await?;

        let staged = {
            let mut executor =
                BulkExecutor::new(&mut *conn, Arc::clone(&self.cache), options.cancellation.clone());
            executor.stage(entity.as_ref(), &staging, &columns, &[], record_iter(records)).await
        };

        match staged {
            Ok(rows_inserted) => {
                info!("Staged {} rows of {} in {}", rows_inserted, entity.name(), staging.name());
                Ok(TempTableQuery {
                    alias: table_name.unwrap_or(entity.name()).to_string(),
                    table: staging,
                    rows_inserted,
                })
            }
            Err(error) => {
                let name = staging.name().clone();
                if let Err(release_error) = staging.release(conn).await {
                    warn!("Could not release staging table {}: {}", name, release_error);
                }
                Err(error)
            }
        }
    }

    /// Deletes the rows `query` reads. `query` is wrapped into a bulk delete unless it already is one.
    pub async fn bulk_delete<C>(&self, conn: &mut C, query: &QueryNode) -> Result<u64, BulkError>
    where
        C: BulkConnection,
    {
        let node = match query {
            QueryNode::BulkDelete(_) => query.clone(),
            other => other.clone().bulk_delete(),
        };
        let translated = QueryTranslator::new(conn.dialect()).translate(&node)?;
        self.execute_delete(conn, &translated).await
    }

    /// Runs a delete translated by a caller-configured [`QueryTranslator`].
    pub async fn execute_delete<C>(&self, conn: &mut C, translated: &TranslatedQuery) -> Result<u64, BulkError>
    where
        C: BulkConnection,
    {
        if !translated.returns_row_count {
            return Err(BulkError::InvalidArgument(format!(
                "'{}' is not a bulk delete statement",
                translated.sql
            )));
        }

        let mut executor = BulkExecutor::new(conn, Arc::clone(&self.cache), CancellationToken::new());
        let affected = executor.execute_counted(translated).await?;

        match &translated.table {
            Some(table) => info!("Bulk deleted {} rows from {}", affected, table),
            None => info!("Bulk deleted {} rows", affected),
        }
        Ok(affected)
    }

    pub async fn truncate_table<C>(&self, conn: &mut C, entity: &Arc<dyn EntityMetadata>) -> Result<(), BulkError>
    where
        C: BulkConnection,
    {
        let mut executor = BulkExecutor::new(conn, Arc::clone(&self.cache), CancellationToken::new());
        executor.truncate(entity.table()).await?;

        info!("Truncated {}", entity.table());
        Ok(())
    }
}

fn record_iter<'r, T, I>(records: I) -> RecordIter<'r>
where
    T: Record + 'r,
    I: IntoIterator<Item = &'r T>,
    I::IntoIter: Send + 'r,
{
    Box::new(records.into_iter().map(|record| record as &dyn Record))
}

/// Rows staged by [`BulkOperations::bulk_insert_into_temp_table`], readable through
/// [`TempTableQuery::query`] until released.
#[derive(Debug)]
pub struct TempTableQuery {
    table: StagingTable,
    rows_inserted: u64,
    alias: String,
}

impl TempTableQuery {
    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted
    }

    pub fn staging_table(&self) -> &StagingTable {
        &self.table
    }

    /// The staging table under its logical name, for binding into a [`QueryTranslator`].
    pub fn reference(&self) -> StagingTableReference {
        self.table.reference(&self.alias)
    }

    /// Every staged row.
    pub fn query(&self) -> QueryNode {
        QueryNode::StagingTable(self.reference())
    }

    pub async fn release<C>(self, conn: &mut C) -> Result<(), BulkError>
    where
        C: BulkConnection + ?Sized,
    {
        self.table.release(conn).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        bulk::{PrimaryKeyCreation, PropertySelection},
        database::{
            sqlite::{SqliteClient, SqliteConnection},
            SqlValue,
        },
        metadata::{ConversionError, EntityModel, FnConverter, PropertyDescriptor, StoreType},
    };

    const CUSTOMER_DDL: &str =
        "CREATE TABLE \"Customer\" (\"Id\" INTEGER PRIMARY KEY, \"Name\" TEXT NOT NULL, \"Email\" TEXT);";
    const ORDER_DDL: &str = "CREATE TABLE \"Order\" (\"CustomerId\" INTEGER NOT NULL, \"Sku\" TEXT NOT NULL);";

    fn customer_builder() -> crate::metadata::EntityModelBuilder {
        EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Id", StoreType::BigInt).auto_increment())
            .property(PropertyDescriptor::new("Name", StoreType::Text).required())
            .property(PropertyDescriptor::new("Email", StoreType::Text))
            .primary_key(&["Id"])
    }

    fn customer() -> Arc<dyn EntityMetadata> {
        customer_builder().build()
    }

    fn customer_with_orders() -> Arc<dyn EntityMetadata> {
        let order = EntityModel::builder("Order")
            .property(PropertyDescriptor::new("CustomerId", StoreType::BigInt).required())
            .property(PropertyDescriptor::new("Sku", StoreType::Text).required())
            .build();
        customer_builder().owned_collection("Orders", order, &[("CustomerId", "Id")]).build()
    }

    async fn connection(ddl: &[&str]) -> SqliteConnection {
        let client = SqliteClient::open_in_memory().unwrap();
        let mut conn = client.connection();
        for sql in ddl {
            conn.batch_execute(sql).await.unwrap();
        }
        conn
    }

    fn operations() -> BulkOperations {
        BulkOperations::new(BulkSettings::default(), Arc::new(PropertyGetterCache::new()))
    }

    async fn customers(conn: &mut SqliteConnection) -> Vec<Vec<SqlValue>> {
        conn.query("SELECT \"Id\", \"Name\", \"Email\" FROM \"Customer\" ORDER BY \"Id\";", &[]).await.unwrap()
    }

    #[tokio::test]
    async fn test_bulk_insert_writes_every_record() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        let records = vec![
            json!({ "Id": 0, "Name": "ada", "Email": "ada@example.com" }),
            json!({ "Id": 0, "Name": "bob", "Email": null }),
            json!({ "Id": 0, "Name": "cy", "Email": "cy@example.com" }),
        ];

        let inserted = operations()
            .bulk_insert(&mut conn, &customer(), &records, &BulkInsertOptions::default())
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        assert_eq!(
            customers(&mut conn).await,
            vec![
                vec![SqlValue::I64(1), SqlValue::from("ada"), SqlValue::from("ada@example.com")],
                vec![SqlValue::I64(2), SqlValue::from("bob"), SqlValue::Null],
                vec![SqlValue::I64(3), SqlValue::from("cy"), SqlValue::from("cy@example.com")],
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_insert_writes_owned_collections() {
        let mut conn = connection(&[CUSTOMER_DDL, ORDER_DDL]).await;
        let records = vec![
            json!({ "Id": 10, "Name": "ada", "Orders": [{ "Sku": "x" }, { "Sku": "y" }] }),
            json!({ "Id": 11, "Name": "bob", "Orders": [] }),
            json!({ "Id": 12, "Name": "cy", "Orders": [{ "Sku": "z" }] }),
        ];
        let options = BulkInsertOptions { auto_increment: AutoIncrementBehavior::KeepValues, ..Default::default() };

        let inserted =
            operations().bulk_insert(&mut conn, &customer_with_orders(), &records, &options).await.unwrap();
        assert_eq!(inserted, 6);

        let orders = conn
            .query("SELECT \"CustomerId\", \"Sku\" FROM \"Order\" ORDER BY \"Sku\";", &[])
            .await
            .unwrap();
        assert_eq!(
            orders,
            vec![
                vec![SqlValue::I64(10), SqlValue::from("x")],
                vec![SqlValue::I64(10), SqlValue::from("y")],
                vec![SqlValue::I64(12), SqlValue::from("z")],
            ]
        );
    }

    #[tokio::test]
    async fn test_owned_collections_need_known_owner_keys() {
        let mut conn = connection(&[CUSTOMER_DDL, ORDER_DDL]).await;
        let records = vec![json!({ "Id": 0, "Name": "ada", "Orders": [{ "Sku": "x" }] })];
        let options =
            BulkInsertOptions { auto_increment: AutoIncrementBehavior::SetZeroToNull, ..Default::default() };

        let error = operations()
            .bulk_insert(&mut conn, &customer_with_orders(), &records, &options)
            .await
            .unwrap_err();
        assert!(matches!(error, BulkError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_owned_collections_reject_omitted_owner_keys() {
        let mut conn = connection(&[CUSTOMER_DDL, ORDER_DDL]).await;
        let records = vec![json!({ "Id": 100, "Name": "ada", "Orders": [{ "Sku": "x" }] })];

        let error = operations()
            .bulk_insert(&mut conn, &customer_with_orders(), &records, &BulkInsertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, BulkError::InvalidOperation(_)));

        assert!(customers(&mut conn).await.is_empty());
        let orders = conn.query("SELECT COUNT(*) FROM \"Order\";", &[]).await.unwrap();
        assert_eq!(orders, vec![vec![SqlValue::I64(0)]]);
    }

    #[tokio::test]
    async fn test_zero_identity_is_assigned_by_the_store() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        let records = vec![json!({ "Id": 7, "Name": "ada" }), json!({ "Id": 0, "Name": "bob" })];
        let options =
            BulkInsertOptions { auto_increment: AutoIncrementBehavior::SetZeroToNull, ..Default::default() };

        let inserted = operations().bulk_insert(&mut conn, &customer(), &records, &options).await.unwrap();
        assert_eq!(inserted, 2);

        let ids: Vec<SqlValue> = customers(&mut conn).await.into_iter().map(|row| row[0].clone()).collect();
        assert_eq!(ids, vec![SqlValue::I64(7), SqlValue::I64(8)]);
    }

    #[tokio::test]
    async fn test_cancelled_insert_sends_nothing() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        let records = vec![json!({ "Name": "ada" }), json!({ "Name": "bob" })];
        let options = BulkInsertOptions::default();
        options.cancellation.cancel();

        let error = operations().bulk_insert(&mut conn, &customer(), &records, &options).await.unwrap_err();
        assert!(matches!(error, BulkError::Cancelled));
        assert!(customers(&mut conn).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_insert_keeps_rows_already_sent() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        let records = vec![
            json!({ "Name": "ada" }),
            json!({ "Name": "bob" }),
            json!({ "Name": "cy" }),
            json!({ "Name": "dee" }),
        ];
        let options = BulkInsertOptions::default();
        let cancellation = options.cancellation.clone();
        let mut pulled = 0;
        let records_then_cancel = records.iter().inspect(move |_| {
            pulled += 1;
            if pulled == 2 {
                cancellation.cancel();
            }
        });

        let error =
            operations().bulk_insert(&mut conn, &customer(), records_then_cancel, &options).await.unwrap_err();
        assert!(matches!(error, BulkError::Cancelled));

        let names: Vec<SqlValue> = customers(&mut conn).await.into_iter().map(|row| row[1].clone()).collect();
        assert_eq!(names, vec![SqlValue::from("ada"), SqlValue::from("bob")]);
    }

    #[tokio::test]
    async fn test_failed_insert_names_the_table() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        let records = vec![json!({ "Email": "nobody@example.com" })];

        let error = operations()
            .bulk_insert(&mut conn, &customer(), &records, &BulkInsertOptions::default())
            .await
            .unwrap_err();
        match error {
            BulkError::OperationFailed { table, .. } => assert_eq!(table, "Customer"),
            other => panic!("expected OperationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bulk_update_matches_on_key() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        conn.batch_execute("INSERT INTO \"Customer\" VALUES (1, 'ada', 'ada@example.com'), (2, 'bob', NULL);")
            .await
            .unwrap();
        let records = vec![json!({ "Id": 2, "Name": "robert" }), json!({ "Id": 99, "Name": "ghost" })];
        let options = BulkUpdateOptions {
            properties: PropertySelection::include("Name").unwrap(),
            ..Default::default()
        };

        let updated = operations().bulk_update(&mut conn, &customer(), &records, &options).await.unwrap();
        assert_eq!(updated, 1);
        assert_eq!(customers(&mut conn).await[1], vec![SqlValue::I64(2), SqlValue::from("robert"), SqlValue::Null]);
    }

    #[tokio::test]
    async fn test_bulk_insert_or_update_counts_both() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        conn.batch_execute("INSERT INTO \"Customer\" VALUES (1, 'ada', 'ada@example.com');").await.unwrap();
        let records = vec![
            json!({ "Id": 1, "Name": "ada lovelace", "Email": "ada@example.org" }),
            json!({ "Id": 0, "Name": "bob", "Email": null }),
        ];

        let affected = operations()
            .bulk_insert_or_update(&mut conn, &customer(), &records, &BulkUpsertOptions::default())
            .await
            .unwrap();
        assert_eq!(affected, 2);

        assert_eq!(
            customers(&mut conn).await,
            vec![
                vec![SqlValue::I64(1), SqlValue::from("ada lovelace"), SqlValue::from("ada@example.org")],
                vec![SqlValue::I64(2), SqlValue::from("bob"), SqlValue::Null],
            ]
        );
        let tables = conn
            .query("SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table';", &[])
            .await
            .unwrap();
        assert_eq!(tables, vec![vec![SqlValue::I64(0)]]);
    }

    #[tokio::test]
    async fn test_failed_staging_still_releases_the_staging_table() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        conn.batch_execute("INSERT INTO \"Customer\" VALUES (1, 'ada', NULL);").await.unwrap();
        let entity = EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Id", StoreType::BigInt).auto_increment())
            .property(PropertyDescriptor::new("Name", StoreType::Text).required())
            .property(PropertyDescriptor::new("Email", StoreType::Text).converter(Arc::new(FnConverter::new(
                |value: SqlValue| match value {
                    SqlValue::String(s) if !s.contains('@') => Err(ConversionError(format!("'{}' is no address", s))),
                    other => Ok(other),
                },
            ))))
            .primary_key(&["Id"])
            .build();
        let records = vec![
            json!({ "Id": 1, "Name": "ada", "Email": "ada@example.com" }),
            json!({ "Id": 0, "Name": "bob", "Email": "bob" }),
        ];

        let error = operations()
            .bulk_insert_or_update(&mut conn, &entity, &records, &BulkUpsertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, BulkError::Conversion { property, .. } if property == "Email"));

        let tables = conn
            .query("SELECT COUNT(*) FROM sqlite_temp_master WHERE type = 'table';", &[])
            .await
            .unwrap();
        assert_eq!(tables, vec![vec![SqlValue::I64(0)]]);
        assert_eq!(customers(&mut conn).await, vec![vec![SqlValue::I64(1), SqlValue::from("ada"), SqlValue::Null]]);
    }

    #[tokio::test]
    async fn test_clones_share_the_given_cache() {
        let cache = Arc::new(PropertyGetterCache::new());
        let operations = BulkOperations::new(BulkSettings::default(), Arc::clone(&cache));

        assert!(Arc::ptr_eq(operations.clone().cache(), &cache));
    }

    #[tokio::test]
    async fn test_temp_table_query_reads_staged_rows() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        conn.batch_execute("INSERT INTO \"Customer\" VALUES (1, 'ada', NULL), (2, 'bob', NULL), (3, 'cy', NULL);")
            .await
            .unwrap();
        let records = vec![json!({ "Id": 1, "Name": "ada" }), json!({ "Id": 3, "Name": "cy" })];
        let options = TempTableInsertOptions {
            temp_table: crate::bulk::TempTableOptions {
                primary_key: PrimaryKeyCreation::EntityKey,
                table_name: Some("recent".to_string()),
            },
            ..Default::default()
        };
        let operations = operations();

        let staged = operations
            .bulk_insert_into_temp_table(&mut conn, &customer(), &records, &options)
            .await
            .unwrap();
        assert_eq!(staged.rows_inserted(), 2);
        assert_eq!(staged.staging_table().primary_key().len(), 1);

        let translator = QueryTranslator::new(conn.dialect());
        let all = translator.translate(&staged.query()).unwrap();
        assert_eq!(conn.query(&all.sql, &[]).await.unwrap().len(), 2);

        let translator = translator.bind_staging_table(staged.reference());
        let joined = QueryNode::parse(
            "SELECT c.\"Name\" FROM \"Customer\" AS c WHERE c.\"Id\" IN (SELECT \"Id\" FROM recent) ORDER BY c.\"Id\"",
        )
        .unwrap();
        let names = conn.query(&translator.translate(&joined).unwrap().sql, &[]).await.unwrap();
        assert_eq!(names, vec![vec![SqlValue::from("ada")], vec![SqlValue::from("cy")]]);

        let name = staged.staging_table().name().clone();
        staged.release(&mut conn).await.unwrap();
        assert!(!operations.temp_tables().table_exists(&mut conn, &name).await.unwrap());
    }

    #[tokio::test]
    async fn test_temp_table_rejects_owned_collections() {
        let mut conn = connection(&[]).await;
        let records: Vec<Value> = Vec::new();

        let error = operations()
            .bulk_insert_into_temp_table(&mut conn, &customer_with_orders(), &records, &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(error, BulkError::NotSupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_bulk_delete_reports_deleted_rows() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        conn.batch_execute("INSERT INTO \"Customer\" VALUES (1, 'ada', NULL), (2, 'bob', NULL), (3, 'cy', NULL);")
            .await
            .unwrap();

        let query = QueryNode::parse("SELECT * FROM \"Customer\" WHERE \"Id\" > 1").unwrap();
        let deleted = operations().bulk_delete(&mut conn, &query).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(customers(&mut conn).await.len(), 1);

        let grouped = QueryNode::parse("SELECT \"Name\" FROM \"Customer\" GROUP BY \"Name\"").unwrap();
        let error = operations().bulk_delete(&mut conn, &grouped).await.unwrap_err();
        assert!(matches!(error, BulkError::NotSupportedOperation(_)));
        assert_eq!(customers(&mut conn).await.len(), 1);
    }

    #[tokio::test]
    async fn test_truncate_table() {
        let mut conn = connection(&[CUSTOMER_DDL]).await;
        conn.batch_execute("INSERT INTO \"Customer\" VALUES (1, 'ada', NULL);").await.unwrap();

        operations().truncate_table(&mut conn, &customer()).await.unwrap();
        assert!(customers(&mut conn).await.is_empty());
    }
}
