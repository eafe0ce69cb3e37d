use std::{fmt, sync::Arc};

use crate::metadata::PropertyDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        TableName { schema: None, name: name.into() }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        TableName { schema: Some(schema.into()), name: name.into() }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Whether an owned sub-object lives in its owner's row or in a table of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavigationKind {
    /// Owned reference stored in the owner's row.
    Inlined,
    /// Owned collection stored in a separate table.
    External,
}

/// Maps a dependent column of an external owned type to the owner's key property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyColumn {
    pub dependent: String,
    pub principal: String,
}

#[derive(Debug)]
pub struct NavigationDescriptor {
    name: String,
    declaring_type: String,
    target: Arc<dyn EntityMetadata>,
    kind: NavigationKind,
    foreign_key: Vec<ForeignKeyColumn>,
}

impl NavigationDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn target(&self) -> &Arc<dyn EntityMetadata> {
        &self.target
    }

    pub fn kind(&self) -> NavigationKind {
        self.kind
    }

    pub fn is_external(&self) -> bool {
        self.kind == NavigationKind::External
    }

    pub fn foreign_key(&self) -> &[ForeignKeyColumn] {
        &self.foreign_key
    }
}

/// The shape of an entity type as exposed by the host object mapper.
pub trait EntityMetadata: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn table(&self) -> &TableName;

    fn properties(&self) -> &[Arc<PropertyDescriptor>];

    fn navigations(&self) -> &[Arc<NavigationDescriptor>];

    /// Property names forming the primary key, in key order.
    fn primary_key(&self) -> &[String];

    fn find_property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.properties().iter().find(|p| p.name() == name)
    }

    fn find_navigation(&self, name: &str) -> Option<&Arc<NavigationDescriptor>> {
        self.navigations().iter().find(|n| n.name() == name)
    }
}

/// In-memory entity metadata, for callers that do not bring their own mapper.
#[derive(Debug)]
pub struct EntityModel {
    name: String,
    table: TableName,
    properties: Vec<Arc<PropertyDescriptor>>,
    navigations: Vec<Arc<NavigationDescriptor>>,
    primary_key: Vec<String>,
}

impl EntityModel {
    pub fn builder(name: impl Into<String>) -> EntityModelBuilder {
        let name = name.into();
        EntityModelBuilder {
            table: TableName::new(name.clone()),
            name,
            properties: Vec::new(),
            navigations: Vec::new(),
            primary_key: Vec::new(),
        }
    }
}

impl EntityMetadata for EntityModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn table(&self) -> &TableName {
        &self.table
    }

    fn properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties
    }

    fn navigations(&self) -> &[Arc<NavigationDescriptor>] {
        &self.navigations
    }

    fn primary_key(&self) -> &[String] {
        &self.primary_key
    }
}

pub struct EntityModelBuilder {
    name: String,
    table: TableName,
    properties: Vec<Arc<PropertyDescriptor>>,
    navigations: Vec<Arc<NavigationDescriptor>>,
    primary_key: Vec<String>,
}

impl EntityModelBuilder {
    pub fn table(mut self, table: TableName) -> Self {
        self.table = table;
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(Arc::new(property.declared_by(&self.name)));
        self
    }

    pub fn owned_reference(mut self, name: impl Into<String>, target: Arc<dyn EntityMetadata>) -> Self {
        self.navigations.push(Arc::new(NavigationDescriptor {
            name: name.into(),
            declaring_type: self.name.clone(),
            target,
            kind: NavigationKind::Inlined,
            foreign_key: Vec::new(),
        }));
        self
    }

    /// `foreign_key` pairs are `(dependent property on the owned type, owner key property)`.
    pub fn owned_collection(
        mut self,
        name: impl Into<String>,
        target: Arc<dyn EntityMetadata>,
        foreign_key: &[(&str, &str)],
    ) -> Self {
        self.navigations.push(Arc::new(NavigationDescriptor {
            name: name.into(),
            declaring_type: self.name.clone(),
            target,
            kind: NavigationKind::External,
            foreign_key: foreign_key
                .iter()
                .map(|(dependent, principal)| ForeignKeyColumn {
                    dependent: dependent.to_string(),
                    principal: principal.to_string(),
                })
                .collect(),
        }));
        self
    }

    pub fn primary_key(mut self, properties: &[&str]) -> Self {
        self.primary_key = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn build(self) -> Arc<dyn EntityMetadata> {
        Arc::new(EntityModel {
            name: self.name,
            table: self.table,
            properties: self.properties,
            navigations: self.navigations,
            primary_key: self.primary_key,
        })
    }
}
