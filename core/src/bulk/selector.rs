use std::{fmt, str::FromStr, sync::Arc};

use serde::Deserialize;

use crate::{
    bulk::{AutoIncrementBehavior, BulkError},
    database::SqlValue,
    metadata::{EntityMetadata, NavigationDescriptor, PropertyPath},
};

/// A member projection over an entity: `Address.Street`, or `{ Name, Address }` for several.
///
/// Parsed from text with [`FromStr`]. The empty string is the null selector, literals
/// (`42`, `'x'`, `true`, `null`) are constants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub enum MemberExpression {
    Null,
    Constant(SqlValue),
    Member(Vec<String>),
    New(Vec<MemberExpression>),
}

impl MemberExpression {
    pub fn member(path: &str) -> Self {
        MemberExpression::Member(path.split('.').map(|s| s.to_string()).collect())
    }

    fn parse_single(text: &str) -> Result<Self, BulkError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(MemberExpression::Null);
        }

        if text.eq_ignore_ascii_case("null") {
            return Ok(MemberExpression::Constant(SqlValue::Null));
        }
        if text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false") {
            return Ok(MemberExpression::Constant(SqlValue::Bool(text.eq_ignore_ascii_case("true"))));
        }
        if text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
            if let Ok(value) = text.parse::<i64>() {
                return Ok(MemberExpression::Constant(SqlValue::I64(value)));
            }
            if let Ok(value) = text.parse::<f64>() {
                return Ok(MemberExpression::Constant(SqlValue::F64(value)));
            }
        }
        for quote in ['\'', '"'] {
            if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
                return Ok(MemberExpression::Constant(SqlValue::String(
                    text[1..text.len() - 1].to_string(),
                )));
            }
        }

        let segments: Vec<String> = text.split('.').map(|s| s.trim().to_string()).collect();
        let is_identifier = |s: &String| {
            !s.is_empty() &&
                s.chars().all(|c| c.is_alphanumeric() || c == '_') &&
                !s.starts_with(|c: char| c.is_ascii_digit())
        };
        if !segments.iter().all(is_identifier) {
            return Err(BulkError::InvalidArgument(format!(
                "'{}' is not a member access expression",
                text
            )));
        }

        Ok(MemberExpression::Member(segments))
    }
}

impl FromStr for MemberExpression {
    type Err = BulkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        match text.strip_prefix('{') {
            Some(rest) => {
                let inner = rest.strip_suffix('}').ok_or_else(|| {
                    BulkError::InvalidArgument(format!("Unterminated projection '{}'", text))
                })?;
                let members = inner
                    .split(',')
                    .filter(|part| !part.trim().is_empty())
                    .map(MemberExpression::parse_single)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(MemberExpression::New(members))
            }
            None => MemberExpression::parse_single(text),
        }
    }
}

impl TryFrom<String> for MemberExpression {
    type Error = BulkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for MemberExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberExpression::Null => write!(f, "<null>"),
            MemberExpression::Constant(value) => write!(f, "{}", value),
            MemberExpression::Member(segments) => write!(f, "{}", segments.join(".")),
            MemberExpression::New(members) => {
                let members = members.iter().map(|m| m.to_string()).collect::<Vec<_>>();
                write!(f, "{{ {} }}", members.join(", "))
            }
        }
    }
}

/// Which properties take part in an operation.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertySelection {
    #[default]
    All,
    Include(MemberExpression),
    Exclude(MemberExpression),
}

impl PropertySelection {
    pub fn include(expression: &str) -> Result<Self, BulkError> {
        Ok(PropertySelection::Include(expression.parse()?))
    }

    pub fn exclude(expression: &str) -> Result<Self, BulkError> {
        Ok(PropertySelection::Exclude(expression.parse()?))
    }
}

/// Resolves selections against one entity shape into ordered [`PropertyPath`] sets.
pub struct PropertySelector<'a> {
    entity: &'a dyn EntityMetadata,
}

impl<'a> PropertySelector<'a> {
    pub fn new(entity: &'a dyn EntityMetadata) -> Self {
        PropertySelector { entity }
    }

    /// Every property reachable from the entity, own properties first, then each owned
    /// navigation in declaration order.
    pub fn all_paths(&self) -> Vec<PropertyPath> {
        collect_paths(self.entity)
    }

    pub fn resolve(&self, selection: &PropertySelection) -> Result<Vec<PropertyPath>, BulkError> {
        match selection {
            PropertySelection::All => Ok(self.all_paths()),
            PropertySelection::Include(expression) => {
                let mut paths: Vec<PropertyPath> = Vec::new();
                for member in flatten_members(expression)? {
                    for path in self.resolve_member(member)? {
                        if !paths.contains(&path) {
                            paths.push(path);
                        }
                    }
                }
                Ok(paths)
            }
            PropertySelection::Exclude(expression) => {
                let mut excluded: Vec<PropertyPath> = Vec::new();
                for member in flatten_members(expression)? {
                    excluded.extend(self.resolve_member(member)?);
                }
                Ok(self.all_paths().into_iter().filter(|p| !excluded.contains(p)).collect())
            }
        }
    }

    /// Insert columns. Auto-increment columns are left out under
    /// [`AutoIncrementBehavior::OmitColumn`] unless an include list names them.
    pub fn insert_properties(
        &self,
        selection: &PropertySelection,
        auto_increment: AutoIncrementBehavior,
    ) -> Result<Vec<PropertyPath>, BulkError> {
        let paths = self.resolve(selection)?;
        let explicit = matches!(selection, PropertySelection::Include(_));
        if auto_increment != AutoIncrementBehavior::OmitColumn || explicit {
            return Ok(paths);
        }
        Ok(paths.into_iter().filter(|p| !p.property().is_auto_increment()).collect())
    }

    /// Update columns: the selection minus key and auto-increment columns.
    pub fn update_properties(
        &self,
        selection: &PropertySelection,
        key_properties: &[PropertyPath],
    ) -> Result<Vec<PropertyPath>, BulkError> {
        let paths = self.resolve(selection)?;
        ensure_no_external_paths("update", &paths)?;
        Ok(paths
            .into_iter()
            .filter(|p| !key_properties.contains(p) && !p.property().is_auto_increment())
            .collect())
    }

    /// Key columns used to match rows. Without an explicit selection the entity's primary
    /// key is used; an entity without one cannot be matched.
    pub fn key_properties(
        &self,
        selection: Option<&PropertySelection>,
    ) -> Result<Vec<PropertyPath>, BulkError> {
        let keys = match selection {
            Some(selection) => self.resolve(selection)?,
            None => self
                .entity
                .primary_key()
                .iter()
                .map(|name| {
                    self.entity
                        .find_property(name)
                        .map(|p| PropertyPath::own(Arc::clone(p)))
                        .ok_or_else(|| {
                            BulkError::InvalidArgument(format!(
                                "Primary key property '{}' is not a property of '{}'",
                                name,
                                self.entity.name()
                            ))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if keys.is_empty() {
            return Err(BulkError::InvalidOperation(format!(
                "The entity '{}' has no key available to match rows",
                self.entity.name()
            )));
        }
        ensure_no_external_paths("match rows by", &keys)?;
        Ok(keys)
    }

    fn resolve_member(&self, segments: &[String]) -> Result<Vec<PropertyPath>, BulkError> {
        let mut entity: &dyn EntityMetadata = self.entity;
        let mut navigations: Vec<Arc<NavigationDescriptor>> = Vec::new();

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();

            if is_last {
                if let Some(property) = entity.find_property(segment) {
                    return Ok(vec![PropertyPath::new(navigations, Arc::clone(property))]);
                }
            }

            match entity.find_navigation(segment) {
                Some(navigation) => {
                    navigations.push(Arc::clone(navigation));
                    entity = navigation.target().as_ref();
                }
                None => {
                    return Err(BulkError::InvalidArgument(format!(
                        "'{}' is not a {} of '{}'",
                        segment,
                        if is_last { "property or owned navigation" } else { "owned navigation" },
                        entity.name()
                    )))
                }
            }
        }

        // the expression ended on a navigation: every property below it
        Ok(collect_paths(entity)
            .into_iter()
            .map(|path| {
                PropertyPath::new(
                    navigations.iter().cloned().chain(path.navigations().iter().cloned()).collect(),
                    Arc::clone(path.property()),
                )
            })
            .collect())
    }
}

fn collect_paths(entity: &dyn EntityMetadata) -> Vec<PropertyPath> {
    let mut paths: Vec<PropertyPath> =
        entity.properties().iter().map(|p| PropertyPath::own(Arc::clone(p))).collect();

    for navigation in entity.navigations() {
        for path in collect_paths(navigation.target().as_ref()) {
            paths.push(path.prepend(navigation));
        }
    }

    paths
}

fn flatten_members(expression: &MemberExpression) -> Result<Vec<&[String]>, BulkError> {
    match expression {
        MemberExpression::Null => {
            Err(BulkError::InvalidArgument("The property selector must not be null".to_string()))
        }
        MemberExpression::Constant(value) => Err(BulkError::UnsupportedSelector(format!(
            "The expression '{}' does not reference a member, the properties it selects cannot be determined",
            value
        ))),
        MemberExpression::Member(segments) => Ok(vec![segments.as_slice()]),
        MemberExpression::New(members) => {
            let mut flattened = Vec::with_capacity(members.len());
            for member in members {
                flattened.extend(flatten_members(member)?);
            }
            Ok(flattened)
        }
    }
}

/// Fails when any owned navigation follows an owned collection on the way to a property:
/// the items of a collection-owned type are written with a flat shape of their own.
pub fn ensure_no_separate_owned_types_inside_collection_owned_type(
    paths: &[PropertyPath],
) -> Result<(), BulkError> {
    let offending: Vec<String> = paths
        .iter()
        .filter(|path| {
            path.navigations()
                .iter()
                .position(|n| n.is_external())
                .is_some_and(|position| position + 1 < path.navigations().len())
        })
        .map(|path| path.to_string())
        .collect();

    if !offending.is_empty() {
        return Err(BulkError::NotSupportedOperation(format!(
            "Owned types nested inside a collection-owned type are not supported: {}",
            offending.join(", ")
        )));
    }
    Ok(())
}

pub(crate) fn ensure_no_external_paths(
    operation: &str,
    paths: &[PropertyPath],
) -> Result<(), BulkError> {
    let external: Vec<String> =
        paths.iter().filter(|p| p.is_external()).map(|p| p.to_string()).collect();

    if !external.is_empty() {
        return Err(BulkError::NotSupportedOperation(format!(
            "Cannot {} properties of owned collections: {}",
            operation,
            external.join(", ")
        )));
    }
    Ok(())
}
