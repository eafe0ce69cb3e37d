// public
pub mod bulk;
pub mod config;
pub mod database;
pub mod metadata;
pub mod query;
pub mod record;

mod helpers;
pub use helpers::{camel_to_snake, generate_random_id, public_read_env_value};

mod logger;
pub use logger::{setup_info_logger, setup_logger, setup_logger_from_settings};

pub use bulk::{
    BulkError, BulkInsertOptions, BulkOperations, BulkUpdateOptions, BulkUpsertOptions,
    PropertySelection, TempTableInsertOptions, TempTableQuery,
};
pub use config::BulkSettings;
pub use database::{
    postgres::{PostgresClient, PostgresConnection},
    sqlite::{SqliteClient, SqliteConnection},
    BulkConnection, SqlValue,
};
pub use metadata::{EntityMetadata, EntityModel, PropertyDescriptor, StoreType, TableName};
pub use query::{QueryNode, QueryTranslator};
pub use record::Record;

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
