use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    bulk::{
        context::{
            identity_sentinel_columns, BulkInsertContext, BulkUpdateContext, BulkUpsertContext,
            ExternalCollection,
        },
        data_reader::RecordIter,
        BulkError, EntityDataReader, PrimaryKeyCreation, PropertyGetterCache, StagingTable,
        TempTableManager,
    },
    database::{BulkConnection, SqlDialect, SqlValue},
    metadata::{EntityMetadata, ForeignKeyColumn, PropertyPath, StoreType, TableName},
    query::TranslatedQuery,
    record::{OwnedItemRecord, Record},
};

/// Drives one top-level operation on one connection: binds rows positionally (or hands them
/// to the native bulk channel), sums affected rows and recurses into owned collections.
pub(crate) struct BulkExecutor<'c, C: BulkConnection> {
    conn: &'c mut C,
    dialect: Arc<dyn SqlDialect>,
    cache: Arc<PropertyGetterCache>,
    cancellation: CancellationToken,
}

impl<'c, C: BulkConnection> BulkExecutor<'c, C> {
    pub fn new(conn: &'c mut C, cache: Arc<PropertyGetterCache>, cancellation: CancellationToken) -> Self {
        let dialect = conn.dialect();
        BulkExecutor { conn, dialect, cache, cancellation }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn insert<'f, 'r: 'f>(
        &'f mut self,
        context: &'f BulkInsertContext,
        records: RecordIter<'r>,
    ) -> BoxFuture<'f, Result<u64, BulkError>> {
        async move {
            context.ensure_owner_keys_written()?;
            let mut reader = EntityDataReader::create(
                context.entity.name(),
                records,
                &context.columns,
                context.has_external(),
                Arc::clone(&self.cache),
            );
            let sentinels = identity_sentinel_columns(context.auto_increment, &context.columns);
            let mut affected = self.write_rows(&context.table, &context.columns, &sentinels, &mut reader).await?;

            if context.has_external() {
                let owners = reader.into_collected_entities();
                for collection in &context.external {
                    affected += self.insert_collection(context, collection, &owners).await?;
                }
            }

            Ok(affected)
        }
        .boxed()
    }

    async fn insert_collection(
        &mut self,
        owner_context: &BulkInsertContext,
        collection: &ExternalCollection,
        owners: &[&dyn Record],
    ) -> Result<u64, BulkError> {
        let child_context = owner_context.for_collection(collection)?;
        let (collection_navigation, inlined) = match collection.navigations.split_last() {
            Some(split) => split,
            None => return Ok(0),
        };

        let mut items: Vec<OwnedItemRecord<'_>> = Vec::new();
        for owner in owners {
            let mut holder = Some(*owner);
            for navigation in inlined {
                holder = holder.and_then(|h| h.owned(navigation.name()));
            }
            let Some(holder) = holder else {
                continue;
            };

            let children = holder.owned_collection(collection_navigation.name());
            if children.is_empty() {
                continue;
            }

            let owner_values = collection_navigation
                .foreign_key()
                .iter()
                .map(|fk| principal_value(owner_context.entity.as_ref(), *owner, fk))
                .collect::<Result<Vec<_>, _>>()?;
            items.extend(
                children.into_iter().map(|inner| OwnedItemRecord { inner, owner_values: owner_values.clone() }),
            );
        }

        if items.is_empty() {
            return Ok(0);
        }

        debug!(
            "Inserting {} items of {}.{} into {}",
            items.len(),
            owner_context.entity.name(),
            collection_navigation.name(),
            child_context.table
        );
        self.insert(&child_context, Box::new(items.iter().map(|item| item as &dyn Record))).await
    }

    pub async fn update(
        &mut self,
        context: &BulkUpdateContext,
        records: RecordIter<'_>,
        temp_tables: &TempTableManager,
    ) -> Result<u64, BulkError> {
        if self.dialect.capabilities().per_row_update {
            let statement =
                self.dialect.update_statement(&context.table, &context.set_columns, &context.key_columns)?;
            let columns: Vec<PropertyPath> =
                context.set_columns.iter().chain(context.key_columns.iter()).cloned().collect();
            let mut reader =
                EntityDataReader::create(context.entity.name(), records, &columns, false, Arc::clone(&self.cache));
            return self.execute_per_row(&context.table, &statement.sql, &[], &mut reader).await;
        }

        let columns = context.staged_columns();
        let staging = temp_tables
            .create(&mut *self.conn, context.entity.as_ref(), &columns, PrimaryKeyCreation::None, None)
            .await?;

        let result = self.update_from_staging(context, &staging, &columns, records).await;
        let released = staging.release(&mut *self.conn).await;
        let affected = result?;
        released?;
        Ok(affected)
    }

    async fn update_from_staging(
        &mut self,
        context: &BulkUpdateContext,
        staging: &StagingTable,
        columns: &[PropertyPath],
        records: RecordIter<'_>,
    ) -> Result<u64, BulkError> {
        let staged = self.stage(context.entity.as_ref(), staging, columns, &[], records).await?;
        debug!("Staged {} rows for update of {}", staged, context.table);

        let sql = self.dialect.update_from_staging_sql(
            &context.table,
            staging.name(),
            &context.set_columns,
            &context.key_columns,
        )?;
        self.execute(&context.table, &sql).await
    }

    /// Stages every record, then applies the staging table to the target.
    pub async fn upsert(
        &mut self,
        context: &BulkUpsertContext,
        records: RecordIter<'_>,
        temp_tables: &TempTableManager,
    ) -> Result<u64, BulkError> {
        let columns = context.staged_columns();
        let staging = temp_tables
            .create(&mut *self.conn, context.entity.as_ref(), &columns, PrimaryKeyCreation::None, None)
            .await?;

        let result = self.upsert_from_staging(context, &staging, &columns, records).await;
        let released = staging.release(&mut *self.conn).await;
        let affected = result?;
        released?;
        Ok(affected)
    }

    async fn upsert_from_staging(
        &mut self,
        context: &BulkUpsertContext,
        staging: &StagingTable,
        columns: &[PropertyPath],
        records: RecordIter<'_>,
    ) -> Result<u64, BulkError> {
        let sentinels = identity_sentinel_columns(context.auto_increment, columns);
        let staged = self.stage(context.entity.as_ref(), staging, columns, &sentinels, records).await?;
        debug!("Staged {} rows for insert or update of {}", staged, context.table);

        let statements = self.dialect.upsert_from_staging_sql(
            &context.table,
            staging.name(),
            &context.insert_columns,
            &context.update_columns,
            &context.key_columns,
        )?;

        let mut affected = 0;
        for sql in &statements {
            affected += self.execute(&context.table, sql).await?;
        }
        Ok(affected)
    }

    /// Writes records straight into an already created staging table.
    pub async fn stage(
        &mut self,
        entity: &dyn EntityMetadata,
        staging: &StagingTable,
        columns: &[PropertyPath],
        sentinels: &[usize],
        records: RecordIter<'_>,
    ) -> Result<u64, BulkError> {
        let mut reader = EntityDataReader::create(entity.name(), records, columns, false, Arc::clone(&self.cache));
        self.write_rows(staging.name(), columns, sentinels, &mut reader).await
    }

    /// Runs a translated statement, reading the affected row count back when the dialect
    /// needs a separate query for it.
    pub async fn execute_counted(&mut self, translated: &TranslatedQuery) -> Result<u64, BulkError> {
        let table = translated.table.clone().unwrap_or_else(|| TableName::new("query"));
        debug!("Bulk statement: {}", translated.sql);
        self.conn
            .execute_counted(&translated.sql, translated.row_count_sql.as_deref())
            .await
            .map_err(|e| BulkError::operation_failed(&table, e))
    }

    pub async fn truncate(&mut self, table: &TableName) -> Result<(), BulkError> {
        let sql = self.dialect.truncate_table_sql(table);
        debug!("Truncating: {}", sql);
        self.conn.batch_execute(&sql).await.map_err(|e| BulkError::operation_failed(table, e))
    }

    async fn write_rows(
        &mut self,
        table: &TableName,
        columns: &[PropertyPath],
        sentinels: &[usize],
        reader: &mut EntityDataReader<'_>,
    ) -> Result<u64, BulkError> {
        if self.dialect.capabilities().native_bulk_copy && sentinels.is_empty() {
            if let Some(sql) = self.dialect.copy_statement(table, columns) {
                let types: Vec<StoreType> = columns.iter().map(|c| c.property().store_type()).collect();
                let copied = self
                    .conn
                    .copy_in(&sql, &types, reader, &self.cancellation)
                    .await
                    .map_err(|e| BulkError::operation_failed(table, e))?;
                info!("Copied {} rows into {}", copied, table);
                return Ok(copied);
            }
        }

        let statement = self.dialect.insert_statement(table, columns)?;
        let inserted = self.execute_per_row(table, &statement.sql, sentinels, reader).await?;
        info!("Inserted {} rows into {}", inserted, table);
        Ok(inserted)
    }

    async fn execute_per_row(
        &mut self,
        table: &TableName,
        sql: &str,
        sentinels: &[usize],
        reader: &mut EntityDataReader<'_>,
    ) -> Result<u64, BulkError> {
        debug!("Bulk statement: {}", sql);
        let statement = self.conn.prepare(sql).await.map_err(|e| BulkError::operation_failed(table, e))?;

        let mut affected = 0;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(BulkError::Cancelled);
            }
            if !reader.read()? {
                break;
            }

            let result = if sentinels.is_empty() {
                let row = reader.current_row();
                self.conn.execute_prepared(&statement, row).await
            } else {
                let row = with_identity_sentinel(reader.current_row(), sentinels);
                self.conn.execute_prepared(&statement, &row).await
            };
            affected += result.map_err(|e| BulkError::operation_failed(table, e))?;
        }
        Ok(affected)
    }

    async fn execute(&mut self, table: &TableName, sql: &str) -> Result<u64, BulkError> {
        debug!("Bulk statement: {}", sql);
        self.conn.execute(sql, &[]).await.map_err(|e| BulkError::operation_failed(table, e))
    }
}

/// Zero values of auto-increment columns become `NULL` so the store assigns the identity.
fn with_identity_sentinel(row: &[SqlValue], sentinels: &[usize]) -> Vec<SqlValue> {
    row.iter()
        .enumerate()
        .map(|(i, value)| {
            if sentinels.contains(&i) && value.is_default_value() {
                SqlValue::Null
            } else {
                value.clone()
            }
        })
        .collect()
}

/// The owner's value for one foreign key column of its collection items.
fn principal_value(
    owner_entity: &dyn EntityMetadata,
    owner: &dyn Record,
    foreign_key: &ForeignKeyColumn,
) -> Result<(String, SqlValue), BulkError> {
    let principal = owner_entity.find_property(&foreign_key.principal).ok_or_else(|| {
        BulkError::InvalidOperation(format!(
            "The principal key property '{}' is not a property of '{}'",
            foreign_key.principal,
            owner_entity.name()
        ))
    })?;

    let value = owner.value(principal.name());
    if principal.is_auto_increment() && value.is_default_value() {
        return Err(BulkError::InvalidOperation(format!(
            "Owned items of '{}' need the store generated key '{}' of their owner, which is not known; \
             insert the owners with their key values",
            owner_entity.name(),
            principal.name()
        )));
    }
    Ok((foreign_key.dependent.clone(), value))
}
