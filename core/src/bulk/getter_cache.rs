use std::sync::{Arc, Mutex};

use mini_moka::sync::Cache;

use crate::{
    bulk::BulkError,
    database::SqlValue,
    metadata::{PropertyPath, ValueConverter},
    record::Record,
};

/// Reads one column value from a root record: walks the owned navigations of a
/// [`PropertyPath`] and applies the property's value converter.
pub struct PropertyGetter {
    path: PropertyPath,
    navigations: Vec<String>,
    property: String,
    converter: Option<Arc<dyn ValueConverter>>,
}

impl PropertyGetter {
    fn build(path: &PropertyPath) -> Self {
        PropertyGetter {
            path: path.clone(),
            navigations: path.navigations().iter().map(|n| n.name().to_string()).collect(),
            property: path.property().name().to_string(),
            converter: path.property().value_converter().cloned(),
        }
    }

    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// A null owned reference on the way yields `Null` for the column.
    pub fn get(&self, record: &dyn Record) -> Result<SqlValue, BulkError> {
        let mut current = record;
        for navigation in &self.navigations {
            match current.owned(navigation) {
                Some(next) => current = next,
                None => return Ok(SqlValue::Null),
            }
        }

        let value = current.value(&self.property);
        match &self.converter {
            Some(converter) if !value.is_null() => converter
                .to_provider(value)
                .map_err(|source| BulkError::Conversion { property: self.path.to_string(), source }),
            _ => Ok(value),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct GetterKey {
    entity_type: String,
    path: PropertyPath,
}

/// Getters keyed by (entity type, property path), shared across operations. The first getter
/// stored for a key is the one every later lookup returns.
pub struct PropertyGetterCache {
    getters: Cache<GetterKey, Arc<PropertyGetter>>,
    advised: Cache<GetterKey, ()>,
    /// Held while a missing entry is checked again and stored.
    fill: Mutex<()>,
}

impl PropertyGetterCache {
    pub fn new() -> Self {
        PropertyGetterCache {
            getters: Cache::builder().build(),
            advised: Cache::builder().build(),
            fill: Mutex::new(()),
        }
    }

    pub fn getter(&self, entity_type: &str, path: &PropertyPath) -> Arc<PropertyGetter> {
        let key = GetterKey { entity_type: entity_type.to_string(), path: path.clone() };
        if let Some(getter) = self.getters.get(&key) {
            return getter;
        }

        let _fill = self.fill.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(getter) = self.getters.get(&key) {
            return getter;
        }
        let getter = Arc::new(PropertyGetter::build(path));
        self.getters.insert(key, Arc::clone(&getter));
        getter
    }

    /// True the first time it is asked for a given (entity type, path).
    pub(crate) fn should_advise(&self, entity_type: &str, path: &PropertyPath) -> bool {
        let key = GetterKey { entity_type: entity_type.to_string(), path: path.clone() };
        if self.advised.contains_key(&key) {
            return false;
        }

        let _fill = self.fill.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.advised.contains_key(&key) {
            return false;
        }
        self.advised.insert(key, ());
        true
    }
}

impl Default for PropertyGetterCache {
    fn default() -> Self {
        Self::new()
    }
}
