//! Entity shape metadata supplied by the host object mapper.
//!
//! The bulk layer only ever talks to [`EntityMetadata`]; [`EntityModel`] is a plain
//! in-memory implementation for callers that describe their entities by hand.

mod converter;
mod entity;
mod path;
mod property;

pub use converter::{BoolToIntConverter, ConversionError, FnConverter, ValueConverter};
pub use entity::{
    EntityMetadata, EntityModel, EntityModelBuilder, ForeignKeyColumn, NavigationDescriptor,
    NavigationKind, TableName,
};
pub use path::PropertyPath;
pub use property::{PropertyDescriptor, StoreType};
