use std::{fmt, sync::Arc};

use serde::Deserialize;

use crate::metadata::converter::ValueConverter;

/// Store-side column type of a property, mapped to a concrete type name by each dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Bool,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Numeric,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    Json,
}

impl StoreType {
    pub fn is_integer(&self) -> bool {
        matches!(self, StoreType::SmallInt | StoreType::Integer | StoreType::BigInt)
    }
}

/// One scalar column of an entity type. Immutable once added to an entity model.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: String,
    column_name: String,
    declaring_type: String,
    store_type: StoreType,
    nullable: bool,
    auto_increment: bool,
    default_value_sql: Option<String>,
    converter: Option<Arc<dyn ValueConverter>>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, store_type: StoreType) -> Self {
        let name = name.into();
        PropertyDescriptor {
            column_name: name.clone(),
            name,
            declaring_type: String::new(),
            store_type,
            nullable: true,
            auto_increment: false,
            default_value_sql: None,
            converter: None,
        }
    }

    pub fn column(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = column_name.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as store generated (identity / rowid alias).
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self.nullable = false;
        self
    }

    pub fn default_value_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_value_sql = Some(sql.into());
        self
    }

    pub fn converter(mut self, converter: Arc<dyn ValueConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub(crate) fn declared_by(mut self, declaring_type: &str) -> Self {
        self.declaring_type = declaring_type.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// The type stored in the column, after any value converter has been applied.
    pub fn store_type(&self) -> StoreType {
        self.converter.as_ref().and_then(|c| c.provider_type()).unwrap_or(self.store_type)
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value_sql.as_deref()
    }

    pub fn value_converter(&self) -> Option<&Arc<dyn ValueConverter>> {
        self.converter.as_ref()
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("column_name", &self.column_name)
            .field("declaring_type", &self.declaring_type)
            .field("store_type", &self.store_type)
            .field("nullable", &self.nullable)
            .field("auto_increment", &self.auto_increment)
            .field("default_value_sql", &self.default_value_sql)
            .field("has_converter", &self.converter.is_some())
            .finish()
    }
}
