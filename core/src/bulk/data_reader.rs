use std::sync::Arc;

use tracing::warn;

use crate::{
    bulk::{BulkError, PropertyGetter, PropertyGetterCache},
    database::{RowSource, SqlValue},
    metadata::PropertyPath,
    record::Record,
};

pub type RecordIter<'a> = Box<dyn Iterator<Item = &'a dyn Record> + Send + 'a>;

/// Forward-only, column-indexed cursor over a sequence of records.
///
/// Each [`read`](EntityDataReader::read) materializes one row with a value per
/// [`PropertyPath`], in the order the paths were given. Owned references are flattened into
/// the row. When the shape has owned collections the records are kept so their items can be
/// written after the owners.
pub struct EntityDataReader<'a> {
    entity_type: String,
    records: RecordIter<'a>,
    properties: Vec<PropertyPath>,
    getters: Vec<Arc<PropertyGetter>>,
    cache: Arc<PropertyGetterCache>,
    current: Vec<SqlValue>,
    collected: Option<Vec<&'a dyn Record>>,
}

impl<'a> EntityDataReader<'a> {
    pub fn create(
        entity_type: &str,
        records: RecordIter<'a>,
        properties: &[PropertyPath],
        has_external_properties: bool,
        cache: Arc<PropertyGetterCache>,
    ) -> Self {
        EntityDataReader {
            entity_type: entity_type.to_string(),
            records,
            properties: properties.to_vec(),
            getters: properties.iter().map(|p| cache.getter(entity_type, p)).collect(),
            cache,
            current: Vec::with_capacity(properties.len()),
            collected: has_external_properties.then(Vec::new),
        }
    }

    /// Advances to the next record. Returns false once the records are exhausted.
    pub fn read(&mut self) -> Result<bool, BulkError> {
        let Some(record) = self.records.next() else {
            self.current.clear();
            return Ok(false);
        };

        self.current.clear();
        for getter in &self.getters {
            let value = getter.get(record)?;
            self.advise_shadowed_default(getter.path(), &value);
            self.current.push(value);
        }

        if let Some(collected) = self.collected.as_mut() {
            collected.push(record);
        }
        Ok(true)
    }

    pub fn field_count(&self) -> usize {
        self.getters.len()
    }

    /// Value of column `i` of the current row.
    pub fn value(&self, i: usize) -> Option<&SqlValue> {
        self.current.get(i)
    }

    pub fn current_row(&self) -> &[SqlValue] {
        &self.current
    }

    pub fn properties(&self) -> &[PropertyPath] {
        &self.properties
    }

    /// Every record read so far, when created with external properties.
    pub fn collected_entities(&self) -> Option<&[&'a dyn Record]> {
        self.collected.as_deref()
    }

    pub(crate) fn into_collected_entities(self) -> Vec<&'a dyn Record> {
        self.collected.unwrap_or_default()
    }

    fn advise_shadowed_default(&self, path: &PropertyPath, value: &SqlValue) {
        let property = path.property();
        if property.is_nullable() || !value.is_default_value() {
            return;
        }
        let Some(default_sql) = property.default_value() else {
            return;
        };

        if self.cache.should_advise(&self.entity_type, path) {
            warn!(
                "{}.{} has the store default {} but the value {} is written instead; the default only \
                 applies when the column is left out of the insert",
                self.entity_type, path, default_sql, value
            );
        }
    }
}

impl RowSource for EntityDataReader<'_> {
    fn column_count(&self) -> usize {
        self.field_count()
    }

    fn next_row(&mut self) -> Result<Option<&[SqlValue]>, BulkError> {
        if self.read()? {
            Ok(Some(self.current_row()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        bulk::{PropertySelection, PropertySelector},
        metadata::{EntityMetadata, EntityModel, PropertyDescriptor, StoreType},
    };

    fn customer() -> Arc<dyn EntityMetadata> {
        let address = EntityModel::builder("Address")
            .property(PropertyDescriptor::new("Street", StoreType::Text))
            .property(PropertyDescriptor::new("City", StoreType::Text))
            .build();
        EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Id", StoreType::BigInt))
            .property(
                PropertyDescriptor::new("Active", StoreType::Bool).required().default_value_sql("TRUE"),
            )
            .owned_reference("Address", address)
            .build()
    }

    fn records() -> Vec<Value> {
        vec![
            json!({ "Id": 1, "Active": true, "Address": { "Street": "Main", "City": "Oslo" } }),
            json!({ "Id": 2, "Active": false, "Address": null }),
        ]
    }

    #[test]
    fn test_rows_follow_property_order_and_flatten_owned_references() {
        let entity = customer();
        let paths = PropertySelector::new(entity.as_ref()).all_paths();
        let records = records();
        let cache = Arc::new(PropertyGetterCache::new());
        let mut reader = EntityDataReader::create(
            entity.name(),
            Box::new(records.iter().map(|r| r as &dyn Record)),
            &paths,
            false,
            Arc::clone(&cache),
        );

        assert_eq!(reader.field_count(), 4);

        assert!(reader.read().unwrap());
        assert_eq!(
            reader.current_row(),
            &[SqlValue::I64(1), SqlValue::Bool(true), SqlValue::from("Main"), SqlValue::from("Oslo")]
        );

        assert!(reader.read().unwrap());
        assert_eq!(reader.value(0), Some(&SqlValue::I64(2)));
        assert_eq!(reader.value(2), Some(&SqlValue::Null));
        assert_eq!(reader.value(3), Some(&SqlValue::Null));

        assert!(!reader.read().unwrap());
        assert!(!reader.read().unwrap());
        assert!(reader.collected_entities().is_none());
    }

    #[test]
    fn test_restricted_shape() {
        let entity = customer();
        let paths = PropertySelector::new(entity.as_ref())
            .resolve(&PropertySelection::include("{ Address.City, Id }").unwrap())
            .unwrap();
        let records = records();
        let cache = Arc::new(PropertyGetterCache::new());
        let mut reader = EntityDataReader::create(
            entity.name(),
            Box::new(records.iter().map(|r| r as &dyn Record)),
            &paths,
            false,
            Arc::clone(&cache),
        );

        assert_eq!(reader.next_row().unwrap(), Some(&[SqlValue::from("Oslo"), SqlValue::I64(1)][..]));
    }

    #[test]
    fn test_collects_entities_for_external_properties() {
        let entity = customer();
        let paths = PropertySelector::new(entity.as_ref()).all_paths();
        let records = records();
        let cache = Arc::new(PropertyGetterCache::new());
        let mut reader = EntityDataReader::create(
            entity.name(),
            Box::new(records.iter().map(|r| r as &dyn Record)),
            &paths,
            true,
            Arc::clone(&cache),
        );

        assert!(reader.read().unwrap());
        assert_eq!(reader.collected_entities().map(|c| c.len()), Some(1));
        while reader.read().unwrap() {}

        let collected = reader.into_collected_entities();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[1].value("Id"), SqlValue::I64(2));
    }

    #[test]
    fn test_shadowed_default_is_advised_once_and_value_kept() {
        let entity = customer();
        let paths = PropertySelector::new(entity.as_ref()).all_paths();
        let records = vec![json!({ "Id": 1, "Active": false }), json!({ "Id": 2, "Active": false })];
        let cache = Arc::new(PropertyGetterCache::new());
        let mut reader = EntityDataReader::create(
            entity.name(),
            Box::new(records.iter().map(|r| r as &dyn Record)),
            &paths,
            false,
            Arc::clone(&cache),
        );

        assert!(reader.read().unwrap());
        assert_eq!(reader.value(1), Some(&SqlValue::Bool(false)));
        assert!(reader.read().unwrap());
        assert_eq!(reader.value(1), Some(&SqlValue::Bool(false)));

        assert!(!cache.should_advise(entity.name(), &paths[1]));
    }
}
