//! Property descriptor tree - the immutable schema of a window
//!
//! A descriptor tree is built once per document type and shared through
//! `Arc`. Groups are layout containers whose children live in the parent's
//! scope; grids open a new scope for their rows.

use std::sync::Arc;

use crate::core::formula::Formula;
use crate::core::value::{PropertyName, Value, ValueType};

/// What a descriptor describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Layout container; children belong to the enclosing scope
    Group,
    /// Nested repeating rows; children form the row scope
    Grid,
    /// A scalar or lookup value
    Value(ValueType),
}

/// Where the display label of a lookup column comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSource {
    pub table: String,
    pub key_column: String,
    pub display_column: String,
}

/// Mapping of a value property onto a table column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub column: String,
    pub key: bool,
    pub parent_link: bool,
    pub encrypted: bool,
    pub lookup: Option<LookupSource>,
}

impl ColumnBinding {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            key: false,
            parent_link: false,
            encrypted: false,
            lookup: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn parent_link(mut self) -> Self {
        self.parent_link = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn lookup(
        mut self,
        table: impl Into<String>,
        key_column: impl Into<String>,
        display_column: impl Into<String>,
    ) -> Self {
        self.lookup = Some(LookupSource {
            table: table.into(),
            key_column: key_column.into(),
            display_column: display_column.into(),
        });
        self
    }
}

/// Immutable description of one property and its nesting
#[derive(Debug)]
pub struct PropertyDescriptor {
    name: PropertyName,
    kind: PropertyKind,
    caption: Option<String>,
    dependencies: Vec<PropertyName>,
    formula: Option<Formula>,
    read_only: bool,
    default_value: Value,
    table: Option<String>,
    column: Option<ColumnBinding>,
    children: Vec<Arc<PropertyDescriptor>>,
}

impl PropertyDescriptor {
    pub fn builder(name: impl Into<PropertyName>, kind: PropertyKind) -> PropertyDescriptorBuilder {
        PropertyDescriptorBuilder {
            name: name.into(),
            kind,
            caption: None,
            dependencies: Vec::new(),
            formula: None,
            read_only: false,
            default_value: Value::Null,
            table: None,
            column: None,
            children: Vec::new(),
        }
    }

    /// Shorthand for a scalar property
    pub fn value(name: impl Into<PropertyName>, value_type: ValueType) -> PropertyDescriptorBuilder {
        Self::builder(name, PropertyKind::Value(value_type))
    }

    /// Shorthand for a layout group
    pub fn group(name: impl Into<PropertyName>) -> PropertyDescriptorBuilder {
        Self::builder(name, PropertyKind::Group)
    }

    /// Shorthand for a grid stored in `table`
    pub fn grid(name: impl Into<PropertyName>, table: impl Into<String>) -> PropertyDescriptorBuilder {
        Self::builder(name, PropertyKind::Grid).table(table)
    }

    pub fn name(&self) -> &PropertyName {
        &self.name
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn caption(&self) -> &str {
        self.caption.as_deref().unwrap_or(self.name.as_str())
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self.kind {
            PropertyKind::Value(value_type) => Some(value_type),
            _ => None,
        }
    }

    pub fn is_grid(&self) -> bool {
        self.kind == PropertyKind::Grid
    }

    pub fn is_group(&self) -> bool {
        self.kind == PropertyKind::Group
    }

    /// Declared dependencies plus the inputs of the formula, without duplicates
    pub fn dependencies(&self) -> &[PropertyName] {
        &self.dependencies
    }

    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    pub fn is_calculated(&self) -> bool {
        self.formula.is_some()
    }

    /// Whether users may not edit this property directly
    pub fn is_read_only(&self) -> bool {
        self.read_only
            || self.is_calculated()
            || self
                .column
                .as_ref()
                .is_some_and(|column| column.key || column.parent_link)
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn column(&self) -> Option<&ColumnBinding> {
        self.column.as_ref()
    }

    pub fn children(&self) -> &[Arc<PropertyDescriptor>] {
        &self.children
    }

    /// Direct child by name
    pub fn child(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.children.iter().find(|c| c.name.as_str() == name)
    }

    /// Properties of this descriptor's scope: groups are flattened, grids are
    /// returned as single entries without descending into their rows
    pub fn scope_properties(&self) -> Vec<&Arc<PropertyDescriptor>> {
        let mut collected = Vec::new();
        collect_scope(&self.children, &mut collected);
        collected
    }

    /// The scope property bound to the key column, if any
    pub fn key_property(&self) -> Option<&Arc<PropertyDescriptor>> {
        self.scope_properties()
            .into_iter()
            .find(|p| p.column.as_ref().is_some_and(|c| c.key))
    }

    /// Depth-first search of the whole tree, grids included
    pub fn find(&self, name: &str) -> Option<&PropertyDescriptor> {
        if self.name.as_str() == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    /// Children of the named descriptor (empty if unknown or a leaf)
    pub fn children_of(&self, name: &str) -> &[Arc<PropertyDescriptor>] {
        self.find(name).map(|d| d.children()).unwrap_or(&[])
    }

    /// Dependencies of the named descriptor (empty if unknown)
    pub fn dependencies_of(&self, name: &str) -> &[PropertyName] {
        self.find(name).map(|d| d.dependencies()).unwrap_or(&[])
    }

    /// Whether the named descriptor is calculated
    pub fn is_calculated_property(&self, name: &str) -> bool {
        self.find(name).is_some_and(|d| d.is_calculated())
    }
}

fn collect_scope<'a>(
    children: &'a [Arc<PropertyDescriptor>],
    collected: &mut Vec<&'a Arc<PropertyDescriptor>>,
) {
    for child in children {
        match child.kind {
            PropertyKind::Group => collect_scope(&child.children, collected),
            PropertyKind::Grid | PropertyKind::Value(_) => collected.push(child),
        }
    }
}

/// Fluent builder for [`PropertyDescriptor`]
pub struct PropertyDescriptorBuilder {
    name: PropertyName,
    kind: PropertyKind,
    caption: Option<String>,
    dependencies: Vec<PropertyName>,
    formula: Option<Formula>,
    read_only: bool,
    default_value: Value,
    table: Option<String>,
    column: Option<ColumnBinding>,
    children: Vec<Arc<PropertyDescriptor>>,
}

impl PropertyDescriptorBuilder {
    pub fn caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn depends_on(mut self, name: impl Into<PropertyName>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn formula(mut self, formula: Formula) -> Self {
        self.formula = Some(formula);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn column(mut self, column: ColumnBinding) -> Self {
        self.column = Some(column);
        self
    }

    pub fn child(mut self, child: Arc<PropertyDescriptor>) -> Self {
        self.children.push(child);
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = Arc<PropertyDescriptor>>,
    {
        self.children.extend(children);
        self
    }

    pub fn build(self) -> Arc<PropertyDescriptor> {
        let mut dependencies: Vec<PropertyName> = Vec::new();
        let formula_inputs = self.formula.as_ref().map(Formula::inputs).unwrap_or_default();
        for name in self.dependencies.into_iter().chain(formula_inputs) {
            if !dependencies.contains(&name) {
                dependencies.push(name);
            }
        }

        Arc::new(PropertyDescriptor {
            name: self.name,
            kind: self.kind,
            caption: self.caption,
            dependencies,
            formula: self.formula,
            read_only: self.read_only,
            default_value: self.default_value,
            table: self.table,
            column: self.column,
            children: self.children,
        })
    }
}
