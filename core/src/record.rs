use serde_json::Value;

use crate::database::SqlValue;

/// A typed record that can be streamed into a bulk operation.
///
/// Scalar properties are looked up by property name. Owned references that are stored in the
/// owner's row are exposed through [`Record::owned`] (`None` means the reference is null), owned
/// collections stored in their own table through [`Record::owned_collection`].
pub trait Record: Send + Sync {
    fn value(&self, property: &str) -> SqlValue;

    fn owned(&self, _navigation: &str) -> Option<&dyn Record> {
        None
    }

    fn owned_collection(&self, _navigation: &str) -> Vec<&dyn Record> {
        Vec::new()
    }
}

/// JSON objects are records: nested objects are owned references, arrays of objects are owned
/// collections.
impl Record for Value {
    fn value(&self, property: &str) -> SqlValue {
        match self.get(property) {
            None | Some(Value::Null) => SqlValue::Null,
            Some(Value::Bool(value)) => SqlValue::Bool(*value),
            Some(Value::Number(number)) => match number.as_i64() {
                Some(value) => SqlValue::I64(value),
                None => number.as_f64().map(SqlValue::F64).unwrap_or(SqlValue::Null),
            },
            Some(Value::String(value)) => SqlValue::String(value.clone()),
            Some(other) => SqlValue::Json(other.clone()),
        }
    }

    fn owned(&self, navigation: &str) -> Option<&dyn Record> {
        match self.get(navigation) {
            Some(value @ Value::Object(_)) => Some(value as &dyn Record),
            _ => None,
        }
    }

    fn owned_collection(&self, navigation: &str) -> Vec<&dyn Record> {
        match self.get(navigation) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|item| item.is_object())
                .map(|item| item as &dyn Record)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An item of an owned collection, with the foreign key columns filled from its owner.
pub(crate) struct OwnedItemRecord<'a> {
    pub(crate) inner: &'a dyn Record,
    pub(crate) owner_values: Vec<(String, SqlValue)>,
}

impl Record for OwnedItemRecord<'_> {
    fn value(&self, property: &str) -> SqlValue {
        match self.owner_values.iter().find(|(dependent, _)| dependent == property) {
            Some((_, value)) => value.clone(),
            None => self.inner.value(property),
        }
    }

    fn owned(&self, navigation: &str) -> Option<&dyn Record> {
        self.inner.owned(navigation)
    }

    fn owned_collection(&self, navigation: &str) -> Vec<&dyn Record> {
        self.inner.owned_collection(navigation)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_record_values() {
        let record = json!({
            "Id": 3,
            "Price": 1.5,
            "Name": "widget",
            "Active": true,
            "Note": null,
            "Address": { "Street": "Main" },
            "Tags": [{ "Label": "a" }, { "Label": "b" }, 7]
        });

        assert_eq!(record.value("Id"), SqlValue::I64(3));
        assert_eq!(record.value("Price"), SqlValue::F64(1.5));
        assert_eq!(record.value("Name"), SqlValue::String("widget".to_string()));
        assert_eq!(record.value("Active"), SqlValue::Bool(true));
        assert_eq!(record.value("Note"), SqlValue::Null);
        assert_eq!(record.value("Missing"), SqlValue::Null);

        let address = record.owned("Address").unwrap();
        assert_eq!(address.value("Street"), SqlValue::String("Main".to_string()));
        assert!(record.owned("Name").is_none());

        assert_eq!(record.owned_collection("Tags").len(), 2);
    }

    #[test]
    fn test_owned_item_record_prefers_owner_values() {
        let item = json!({ "OrderId": 0, "Sku": "x" });
        let record = OwnedItemRecord {
            inner: &item,
            owner_values: vec![("OrderId".to_string(), SqlValue::I64(9))],
        };

        assert_eq!(record.value("OrderId"), SqlValue::I64(9));
        assert_eq!(record.value("Sku"), SqlValue::String("x".to_string()));
    }
}
