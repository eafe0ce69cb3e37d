//! Bulk insert, update, insert-or-update and staging of entity records.

pub(crate) mod context;
mod data_reader;
mod error;
pub(crate) mod executor;
mod getter_cache;
mod operations;
mod options;
mod selector;
mod temp_table;

pub use data_reader::{EntityDataReader, RecordIter};
pub use error::BulkError;
pub use getter_cache::{PropertyGetter, PropertyGetterCache};
pub use operations::{BulkOperations, TempTableQuery};
pub use options::{
    AutoIncrementBehavior, BulkInsertOptions, BulkUpdateOptions, BulkUpsertOptions,
    PrimaryKeyCreation, TempTableInsertOptions, TempTableOptions,
};
pub use selector::{
    ensure_no_separate_owned_types_inside_collection_owned_type, MemberExpression,
    PropertySelection, PropertySelector,
};
pub use temp_table::{StagingTable, TempTableManager};
