use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::bulk::PropertySelection;

/// What to do with store generated (auto-increment) columns on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoIncrementBehavior {
    /// Leave the column out so the store assigns every value.
    #[default]
    OmitColumn,
    /// Write the values carried by the records.
    KeepValues,
    /// Write the values carried by the records, but send `NULL` for zero so the store assigns
    /// the next identity. Only for stores that treat a `NULL` identity that way.
    SetZeroToNull,
}

/// Whether a staging table gets a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyCreation {
    None,
    /// Always the entity key; fails when a key column is not staged.
    EntityKey,
    /// The entity key if every key column is staged, otherwise none.
    #[default]
    Adaptive,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BulkInsertOptions {
    pub properties: PropertySelection,
    pub auto_increment: AutoIncrementBehavior,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BulkUpdateOptions {
    pub properties: PropertySelection,
    /// Match on these instead of the primary key.
    pub key_properties: Option<PropertySelection>,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BulkUpsertOptions {
    pub insert_properties: PropertySelection,
    pub update_properties: PropertySelection,
    pub key_properties: Option<PropertySelection>,
    pub auto_increment: AutoIncrementBehavior,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TempTableOptions {
    pub primary_key: PrimaryKeyCreation,
    /// Logical name of the staging table; a random suffix is always appended.
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TempTableInsertOptions {
    pub properties: PropertySelection,
    pub temp_table: TempTableOptions,
    #[serde(skip)]
    pub cancellation: CancellationToken,
}
