use std::sync::Arc;

use crate::{
    bulk::{
        selector::{ensure_no_external_paths, ensure_no_separate_owned_types_inside_collection_owned_type},
        AutoIncrementBehavior, BulkError, BulkInsertOptions, BulkUpdateOptions, BulkUpsertOptions,
        PropertySelector,
    },
    database::SqlDialect,
    metadata::{EntityMetadata, NavigationDescriptor, PropertyPath, TableName},
};

/// An owned collection reached from the root entity, with the columns written for its items.
#[derive(Debug, Clone)]
pub(crate) struct ExternalCollection {
    /// Inlined navigations leading to the collection, the collection navigation last.
    pub navigations: Vec<Arc<NavigationDescriptor>>,
    /// Selected paths relative to a collection item.
    pub properties: Vec<PropertyPath>,
}

impl ExternalCollection {
    pub fn collection(&self) -> Option<&Arc<NavigationDescriptor>> {
        self.navigations.last()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BulkInsertContext {
    pub entity: Arc<dyn EntityMetadata>,
    pub table: TableName,
    /// Columns of the entity's own row, inlined owned references included.
    pub columns: Vec<PropertyPath>,
    pub external: Vec<ExternalCollection>,
    pub auto_increment: AutoIncrementBehavior,
}

impl BulkInsertContext {
    pub fn create(
        entity: &Arc<dyn EntityMetadata>,
        options: &BulkInsertOptions,
        dialect: &dyn SqlDialect,
    ) -> Result<Self, BulkError> {
        ensure_auto_increment_supported(options.auto_increment, dialect)?;

        let paths = PropertySelector::new(entity.as_ref())
            .insert_properties(&options.properties, options.auto_increment)?;
        ensure_no_separate_owned_types_inside_collection_owned_type(&paths)?;

        let mut columns = Vec::new();
        let mut external: Vec<ExternalCollection> = Vec::new();
        for path in paths {
            match path.split_external() {
                None => columns.push(path),
                Some((navigations, relative)) => {
                    let position = external.iter().position(|e| same_navigations(&e.navigations, navigations));
                    match position {
                        Some(i) => external[i].properties.push(relative),
                        None => external.push(ExternalCollection {
                            navigations: navigations.to_vec(),
                            properties: vec![relative],
                        }),
                    }
                }
            }
        }

        Ok(BulkInsertContext {
            entity: Arc::clone(entity),
            table: entity.table().clone(),
            columns,
            external,
            auto_increment: options.auto_increment,
        })
    }

    pub fn has_external(&self) -> bool {
        !self.external.is_empty()
    }

    /// Context for the items of `collection`. Foreign key columns are always written, even
    /// when the selection left them out.
    pub fn for_collection(&self, collection: &ExternalCollection) -> Result<BulkInsertContext, BulkError> {
        let navigation = collection.collection().ok_or_else(|| {
            BulkError::InvalidOperation("An owned collection needs at least one navigation".to_string())
        })?;
        let target = navigation.target();

        let mut columns = collection.properties.clone();
        for foreign_key in navigation.foreign_key() {
            let dependent = target.find_property(&foreign_key.dependent).ok_or_else(|| {
                BulkError::InvalidOperation(format!(
                    "The foreign key property '{}' is not a property of '{}'",
                    foreign_key.dependent,
                    target.name()
                ))
            })?;
            let path = PropertyPath::own(Arc::clone(dependent));
            if !columns.contains(&path) {
                columns.push(path);
            }
        }

        Ok(BulkInsertContext {
            entity: Arc::clone(target),
            table: target.table().clone(),
            columns,
            external: Vec::new(),
            auto_increment: self.auto_increment,
        })
    }

    /// Collection items copy their owner's key values. An auto-increment owner key that the
    /// insert leaves out is assigned by the store, and the copied value would match no row.
    pub fn ensure_owner_keys_written(&self) -> Result<(), BulkError> {
        for navigation in self.external.iter().filter_map(ExternalCollection::collection) {
            for foreign_key in navigation.foreign_key() {
                let Some(principal) = self.entity.find_property(&foreign_key.principal) else {
                    continue;
                };
                let written = self
                    .columns
                    .iter()
                    .any(|c| c.navigations().is_empty() && c.property().name() == principal.name());
                if principal.is_auto_increment() && !written {
                    return Err(BulkError::InvalidOperation(format!(
                        "Owned items of '{}.{}' need the key '{}' of their owner, which the store \
                         generates because the column is not inserted; insert the owners with \
                         AutoIncrementBehavior::KeepValues",
                        self.entity.name(),
                        navigation.name(),
                        principal.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BulkUpdateContext {
    pub entity: Arc<dyn EntityMetadata>,
    pub table: TableName,
    pub set_columns: Vec<PropertyPath>,
    pub key_columns: Vec<PropertyPath>,
}

impl BulkUpdateContext {
    pub fn create(entity: &Arc<dyn EntityMetadata>, options: &BulkUpdateOptions) -> Result<Self, BulkError> {
        let selector = PropertySelector::new(entity.as_ref());
        let key_columns = selector.key_properties(options.key_properties.as_ref())?;
        let set_columns = selector.update_properties(&options.properties, &key_columns)?;

        if set_columns.is_empty() {
            return Err(BulkError::NotSupportedOperation(format!(
                "No columns of '{}' are left to update once the key columns are removed",
                entity.name()
            )));
        }

        Ok(BulkUpdateContext {
            entity: Arc::clone(entity),
            table: entity.table().clone(),
            set_columns,
            key_columns,
        })
    }

    /// Keys first, then the updated columns.
    pub fn staged_columns(&self) -> Vec<PropertyPath> {
        union(&[&self.key_columns, &self.set_columns])
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BulkUpsertContext {
    pub entity: Arc<dyn EntityMetadata>,
    pub table: TableName,
    pub insert_columns: Vec<PropertyPath>,
    pub update_columns: Vec<PropertyPath>,
    pub key_columns: Vec<PropertyPath>,
    pub auto_increment: AutoIncrementBehavior,
}

impl BulkUpsertContext {
    pub fn create(
        entity: &Arc<dyn EntityMetadata>,
        options: &BulkUpsertOptions,
        dialect: &dyn SqlDialect,
    ) -> Result<Self, BulkError> {
        ensure_auto_increment_supported(options.auto_increment, dialect)?;

        let selector = PropertySelector::new(entity.as_ref());
        let key_columns = selector.key_properties(options.key_properties.as_ref())?;
        let insert_columns = selector.insert_properties(&options.insert_properties, options.auto_increment)?;
        ensure_no_external_paths("insert or update", &insert_columns)?;
        if insert_columns.is_empty() {
            return Err(BulkError::NotSupportedOperation(format!(
                "No columns of '{}' are selected for insert",
                entity.name()
            )));
        }
        let update_columns = selector.update_properties(&options.update_properties, &key_columns)?;

        Ok(BulkUpsertContext {
            entity: Arc::clone(entity),
            table: entity.table().clone(),
            insert_columns,
            update_columns,
            key_columns,
            auto_increment: options.auto_increment,
        })
    }

    /// Every column any of the two statements reads from the staging table.
    pub fn staged_columns(&self) -> Vec<PropertyPath> {
        union(&[&self.key_columns, &self.insert_columns, &self.update_columns])
    }
}

/// Positions of the auto-increment columns that get the null sentinel for zero values.
pub(crate) fn identity_sentinel_columns(behavior: AutoIncrementBehavior, columns: &[PropertyPath]) -> Vec<usize> {
    if behavior != AutoIncrementBehavior::SetZeroToNull {
        return Vec::new();
    }
    columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.property().is_auto_increment())
        .map(|(i, _)| i)
        .collect()
}

fn ensure_auto_increment_supported(
    behavior: AutoIncrementBehavior,
    dialect: &dyn SqlDialect,
) -> Result<(), BulkError> {
    if behavior == AutoIncrementBehavior::SetZeroToNull && !dialect.capabilities().null_assigns_identity {
        return Err(BulkError::NotSupportedOperation(format!(
            "{} does not assign an identity for a NULL value",
            dialect.name()
        )));
    }
    Ok(())
}

fn same_navigations(a: &[Arc<NavigationDescriptor>], b: &[Arc<NavigationDescriptor>]) -> bool {
    a.len() == b.len() &&
        a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.declaring_type() == y.declaring_type() && x.name() == y.name())
}

fn union(sets: &[&Vec<PropertyPath>]) -> Vec<PropertyPath> {
    let mut columns: Vec<PropertyPath> = Vec::new();
    for path in sets.iter().flat_map(|set| set.iter()) {
        if !columns.contains(path) {
            columns.push(path.clone());
        }
    }
    columns
}
