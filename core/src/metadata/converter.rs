use crate::{database::SqlValue, metadata::StoreType};

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct ConversionError(pub String);

/// Converts a domain value into the value the store keeps in the column.
pub trait ValueConverter: Send + Sync {
    fn to_provider(&self, value: SqlValue) -> Result<SqlValue, ConversionError>;

    /// The store type produced by the conversion, when it differs from the property type.
    fn provider_type(&self) -> Option<StoreType> {
        None
    }
}

/// Closure backed converter.
pub struct FnConverter<F> {
    convert: F,
    provider_type: Option<StoreType>,
}

impl<F> FnConverter<F>
where
    F: Fn(SqlValue) -> Result<SqlValue, ConversionError> + Send + Sync,
{
    pub fn new(convert: F) -> Self {
        FnConverter { convert, provider_type: None }
    }

    pub fn with_provider_type(mut self, provider_type: StoreType) -> Self {
        self.provider_type = Some(provider_type);
        self
    }
}

impl<F> ValueConverter for FnConverter<F>
where
    F: Fn(SqlValue) -> Result<SqlValue, ConversionError> + Send + Sync,
{
    fn to_provider(&self, value: SqlValue) -> Result<SqlValue, ConversionError> {
        (self.convert)(value)
    }

    fn provider_type(&self) -> Option<StoreType> {
        self.provider_type
    }
}

/// Stores booleans as `0` / `1`.
pub struct BoolToIntConverter;

impl ValueConverter for BoolToIntConverter {
    fn to_provider(&self, value: SqlValue) -> Result<SqlValue, ConversionError> {
        match value {
            SqlValue::Null => Ok(SqlValue::Null),
            SqlValue::Bool(value) => Ok(SqlValue::I32(i32::from(value))),
            other => Err(ConversionError(format!("expected a boolean, got {}", other))),
        }
    }

    fn provider_type(&self) -> Option<StoreType> {
        Some(StoreType::Integer)
    }
}
