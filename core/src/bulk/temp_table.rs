use std::sync::Arc;

use tracing::{debug, error};

use crate::{
    bulk::{selector::ensure_no_external_paths, BulkError, PrimaryKeyCreation, PropertySelector},
    config::BulkSettings,
    database::{common_sql::generate::generate_staging_table_name, BulkConnection},
    helpers::generate_random_id,
    metadata::{EntityMetadata, PropertyPath, TableName},
    query::StagingTableReference,
};

/// A live staging table. It must be given back with [`StagingTable::release`] on every path,
/// error paths included; dropping the handle without releasing it leaves the table behind.
#[derive(Debug)]
pub struct StagingTable {
    name: TableName,
    columns: Vec<PropertyPath>,
    primary_key: Vec<PropertyPath>,
    drop_on_release: bool,
    released: bool,
}

impl StagingTable {
    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn columns(&self) -> &[PropertyPath] {
        &self.columns
    }

    pub fn primary_key(&self) -> &[PropertyPath] {
        &self.primary_key
    }

    /// A query source over the table under `alias`.
    pub fn reference(&self, alias: &str) -> StagingTableReference {
        StagingTableReference { table: self.name.clone(), alias: alias.to_string() }
    }

    pub async fn release<C>(mut self, conn: &mut C) -> Result<(), BulkError>
    where
        C: BulkConnection + ?Sized,
    {
        self.released = true;
        if !self.drop_on_release {
            debug!("Keeping staging table {} for the session", self.name);
            return Ok(());
        }

        let sql = conn.dialect().drop_table_sql(&self.name);
        debug!("Dropping staging table: {}", sql);
        conn.batch_execute(&sql).await.map_err(|e| BulkError::operation_failed(&self.name, e))
    }
}

impl Drop for StagingTable {
    fn drop(&mut self) {
        if !self.released {
            error!("Staging table {} was dropped without being released", self.name);
        }
    }
}

/// Creates staging tables shaped after an entity or a subset of its columns.
#[derive(Debug, Clone)]
pub struct TempTableManager {
    prefix: String,
    suffix_length: usize,
    drop_on_release: bool,
}

impl TempTableManager {
    pub fn new(settings: &BulkSettings) -> Self {
        TempTableManager {
            prefix: settings.temp_table_prefix.clone(),
            suffix_length: settings.temp_table_suffix_length,
            drop_on_release: settings.drop_temp_tables_on_release,
        }
    }

    /// `table_name` is the logical name; a random suffix keeps concurrent tables apart.
    pub async fn create<C>(
        &self,
        conn: &mut C,
        entity: &dyn EntityMetadata,
        columns: &[PropertyPath],
        primary_key: PrimaryKeyCreation,
        table_name: Option<&str>,
    ) -> Result<StagingTable, BulkError>
    where
        C: BulkConnection + ?Sized,
    {
        ensure_no_external_paths("stage", columns)?;
        let primary_key = resolve_primary_key(entity, columns, primary_key)?;

        let dialect = conn.dialect();
        let name = dialect.temp_table_name(&generate_staging_table_name(
            &self.prefix,
            table_name.unwrap_or(entity.name()),
            &generate_random_id(self.suffix_length),
        ));

        let sql = dialect.create_temp_table_sql(&name, columns, &primary_key);
        debug!("Creating staging table: {}", sql);
        conn.batch_execute(&sql).await.map_err(|e| BulkError::operation_failed(&name, e))?;

        Ok(StagingTable {
            name,
            columns: columns.to_vec(),
            primary_key,
            drop_on_release: self.drop_on_release,
            released: false,
        })
    }

    /// A staging table with every column of the entity's own row.
    pub async fn create_for_entity<C>(
        &self,
        conn: &mut C,
        entity: &dyn EntityMetadata,
        primary_key: PrimaryKeyCreation,
        table_name: Option<&str>,
    ) -> Result<StagingTable, BulkError>
    where
        C: BulkConnection + ?Sized,
    {
        let columns: Vec<PropertyPath> =
            PropertySelector::new(entity).all_paths().into_iter().filter(|p| !p.is_external()).collect();
        self.create(conn, entity, &columns, primary_key, table_name).await
    }

    pub async fn table_exists<C>(&self, conn: &mut C, table: &TableName) -> Result<bool, BulkError>
    where
        C: BulkConnection + ?Sized,
    {
        let sql = conn.dialect().table_exists_sql(table);
        let rows = conn.query(&sql, &[]).await.map_err(|e| BulkError::operation_failed(table, e))?;

        Ok(rows.first().and_then(|row| row.first()).and_then(|value| value.as_i64()).unwrap_or(0) != 0)
    }
}

fn resolve_primary_key(
    entity: &dyn EntityMetadata,
    columns: &[PropertyPath],
    creation: PrimaryKeyCreation,
) -> Result<Vec<PropertyPath>, BulkError> {
    if creation == PrimaryKeyCreation::None {
        return Ok(Vec::new());
    }

    let key: Vec<PropertyPath> = entity
        .primary_key()
        .iter()
        .filter_map(|name| entity.find_property(name))
        .map(|p| PropertyPath::own(Arc::clone(p)))
        .collect();
    let complete = !key.is_empty() &&
        key.len() == entity.primary_key().len() &&
        key.iter().all(|k| columns.contains(k));

    match creation {
        PrimaryKeyCreation::EntityKey if !complete => Err(BulkError::InvalidOperation(format!(
            "Cannot create the primary key of '{}' on a staging table without all of its key columns",
            entity.name()
        ))),
        _ if complete => Ok(key),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        database::{sqlite::SqliteClient, SqlValue},
        metadata::{EntityModel, PropertyDescriptor, StoreType},
    };

    fn customer() -> Arc<dyn EntityMetadata> {
        let order = EntityModel::builder("Order")
            .property(PropertyDescriptor::new("CustomerId", StoreType::BigInt))
            .build();
        EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Id", StoreType::BigInt))
            .property(PropertyDescriptor::new("Name", StoreType::Text))
            .owned_collection("Orders", order, &[("CustomerId", "Id")])
            .primary_key(&["Id"])
            .build()
    }

    fn manager() -> TempTableManager {
        TempTableManager::new(&BulkSettings::default())
    }

    #[tokio::test]
    async fn test_create_and_release_leaves_no_table() {
        let client = SqliteClient::open_in_memory().unwrap();
        let mut conn = client.connection();
        let entity = customer();
        let manager = manager();

        for _ in 0..2 {
            let staging = manager
                .create_for_entity(&mut conn, entity.as_ref(), PrimaryKeyCreation::Adaptive, None)
                .await
                .unwrap();
            let name = staging.name().clone();

            assert!(name.name.starts_with("bulk_stage_customer_"));
            assert_eq!(staging.primary_key().len(), 1);
            assert!(manager.table_exists(&mut conn, &name).await.unwrap());

            staging.release(&mut conn).await.unwrap();
            assert!(!manager.table_exists(&mut conn, &name).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_primary_key_enforced_on_staging_table() {
        let client = SqliteClient::open_in_memory().unwrap();
        let mut conn = client.connection();
        let entity = customer();

        let staging = manager()
            .create_for_entity(&mut conn, entity.as_ref(), PrimaryKeyCreation::EntityKey, Some("Recent"))
            .await
            .unwrap();
        assert!(staging.name().name.starts_with("bulk_stage_recent_"));

        let insert = format!("INSERT INTO \"{}\" (\"Id\", \"Name\") VALUES (?1, ?2);", staging.name().name);
        conn.execute(&insert, &[SqlValue::I64(1), SqlValue::from("a")]).await.unwrap();
        assert!(conn.execute(&insert, &[SqlValue::I64(1), SqlValue::from("b")]).await.is_err());

        staging.release(&mut conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_entity_key_requires_key_columns() {
        let client = SqliteClient::open_in_memory().unwrap();
        let mut conn = client.connection();
        let entity = customer();
        let name_only = vec![PropertyPath::own(Arc::clone(&entity.properties()[1]))];

        let error = manager()
            .create(&mut conn, entity.as_ref(), &name_only, PrimaryKeyCreation::EntityKey, None)
            .await
            .unwrap_err();
        assert!(matches!(error, BulkError::InvalidOperation(_)));

        let staging = manager()
            .create(&mut conn, entity.as_ref(), &name_only, PrimaryKeyCreation::Adaptive, None)
            .await
            .unwrap();
        assert!(staging.primary_key().is_empty());
        staging.release(&mut conn).await.unwrap();
    }

    #[tokio::test]
    async fn test_external_columns_are_rejected_before_ddl() {
        let client = SqliteClient::open_in_memory().unwrap();
        let mut conn = client.connection();
        let entity = customer();
        let all = PropertySelector::new(entity.as_ref()).all_paths();

        let error = manager()
            .create(&mut conn, entity.as_ref(), &all, PrimaryKeyCreation::None, None)
            .await
            .unwrap_err();
        assert!(matches!(error, BulkError::NotSupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_release_can_keep_the_table() {
        let client = SqliteClient::open_in_memory().unwrap();
        let mut conn = client.connection();
        let entity = customer();
        let settings = BulkSettings { drop_temp_tables_on_release: false, ..Default::default() };
        let manager = TempTableManager::new(&settings);

        let staging = manager
            .create_for_entity(&mut conn, entity.as_ref(), PrimaryKeyCreation::None, None)
            .await
            .unwrap();
        let name = staging.name().clone();
        staging.release(&mut conn).await.unwrap();

        assert!(manager.table_exists(&mut conn, &name).await.unwrap());
    }
}
