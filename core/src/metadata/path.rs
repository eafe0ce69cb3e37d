use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::metadata::{NavigationDescriptor, PropertyDescriptor};

/// A property plus the chain of owned navigations leading to it from the root entity.
///
/// Equality and hashing are path based: two paths are equal when they walk the same
/// navigations (by declaring type and name) to the same property, regardless of which
/// descriptor instances they hold.
#[derive(Clone)]
pub struct PropertyPath {
    navigations: Vec<Arc<NavigationDescriptor>>,
    property: Arc<PropertyDescriptor>,
}

impl PropertyPath {
    pub fn new(navigations: Vec<Arc<NavigationDescriptor>>, property: Arc<PropertyDescriptor>) -> Self {
        PropertyPath { navigations, property }
    }

    pub fn own(property: Arc<PropertyDescriptor>) -> Self {
        PropertyPath { navigations: Vec::new(), property }
    }

    pub fn property(&self) -> &Arc<PropertyDescriptor> {
        &self.property
    }

    pub fn navigations(&self) -> &[Arc<NavigationDescriptor>] {
        &self.navigations
    }

    pub fn is_own(&self) -> bool {
        self.navigations.is_empty()
    }

    /// True if any navigation on the way is an owned collection.
    pub fn is_external(&self) -> bool {
        self.navigations.iter().any(|n| n.is_external())
    }

    pub fn column_name(&self) -> &str {
        self.property.column_name()
    }

    /// Member names from the root, e.g. `["Address", "Street"]`.
    pub fn member_path(&self) -> Vec<&str> {
        self.navigations
            .iter()
            .map(|n| n.name())
            .chain(std::iter::once(self.property.name()))
            .collect()
    }

    pub(crate) fn prepend(&self, navigation: &Arc<NavigationDescriptor>) -> PropertyPath {
        let mut navigations = Vec::with_capacity(self.navigations.len() + 1);
        navigations.push(Arc::clone(navigation));
        navigations.extend(self.navigations.iter().cloned());
        PropertyPath { navigations, property: Arc::clone(&self.property) }
    }

    /// Splits an external path at its first collection navigation: the navigations up to and
    /// including the collection, and the remaining path relative to the collection item.
    pub(crate) fn split_external(&self) -> Option<(&[Arc<NavigationDescriptor>], PropertyPath)> {
        let position = self.navigations.iter().position(|n| n.is_external())?;
        let remainder = PropertyPath {
            navigations: self.navigations[position + 1..].to_vec(),
            property: Arc::clone(&self.property),
        };
        Some((&self.navigations[..=position], remainder))
    }
}

impl PartialEq for PropertyPath {
    fn eq(&self, other: &Self) -> bool {
        self.navigations.len() == other.navigations.len() &&
            self.navigations.iter().zip(other.navigations.iter()).all(|(a, b)| {
                a.declaring_type() == b.declaring_type() && a.name() == b.name()
            }) &&
            self.property.declaring_type() == other.property.declaring_type() &&
            self.property.name() == other.property.name()
    }
}

impl Eq for PropertyPath {}

impl Hash for PropertyPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for navigation in &self.navigations {
            navigation.declaring_type().hash(state);
            navigation.name().hash(state);
        }
        self.property.declaring_type().hash(state);
        self.property.name().hash(state);
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.member_path().join("."))
    }
}

impl fmt::Debug for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyPath({})", self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::metadata::{EntityModel, StoreType};

    #[test]
    fn test_equality_is_path_based() {
        let first = EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Name", StoreType::Text))
            .build();
        let second = EntityModel::builder("Customer")
            .property(PropertyDescriptor::new("Name", StoreType::Text).column("customer_name"))
            .build();

        let a = PropertyPath::own(Arc::clone(&first.properties()[0]));
        let b = PropertyPath::own(Arc::clone(&second.properties()[0]));

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_split_external() {
        let line = EntityModel::builder("OrderLine")
            .property(PropertyDescriptor::new("Sku", StoreType::Text))
            .build();
        let order = EntityModel::builder("Order")
            .property(PropertyDescriptor::new("Id", StoreType::BigInt))
            .owned_collection("Lines", Arc::clone(&line), &[("OrderId", "Id")])
            .build();

        let path = PropertyPath::own(Arc::clone(&line.properties()[0]))
            .prepend(&order.navigations()[0]);

        assert!(path.is_external());
        assert_eq!(path.to_string(), "Lines.Sku");

        let (prefix, remainder) = path.split_external().unwrap();
        assert_eq!(prefix.len(), 1);
        assert!(remainder.is_own());
        assert_eq!(remainder.to_string(), "Sku");
    }
}
