//! Runtime property values: stored, calculated and grid variants
//!
//! The propagation engine in [`crate::core::collection`] only talks to
//! [`PropertyValue`]; the variants decide how they react to being set and to
//! a dependency having changed.

mod grid;

pub use grid::{GridPropertyValue, GridRow, GridRowId};

use std::sync::Arc;

use tracing::warn;

use crate::core::descriptor::PropertyDescriptor;
use crate::core::error::{ModelError, Result};
use crate::core::formula::{Formula, ValueLookup};
use crate::core::value::{PropertyName, Value, ValueType};

/// A value set from a loaded row or by the user
#[derive(Debug, Clone)]
pub struct StoredPropertyValue {
    descriptor: Arc<PropertyDescriptor>,
    value: Value,
    baseline: Value,
}

impl StoredPropertyValue {
    pub fn new(descriptor: Arc<PropertyDescriptor>) -> Self {
        let value = descriptor.default_value().clone();
        Self {
            descriptor,
            baseline: value.clone(),
            value,
        }
    }

    pub fn name(&self) -> &PropertyName {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<PropertyDescriptor> {
        &self.descriptor
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Coerce `value` to the declared type of this property
    pub fn normalize(&self, value: Value) -> Result<Value> {
        match self.descriptor.value_type() {
            Some(value_type) => value_type.normalize(self.name(), value),
            None => Ok(value),
        }
    }

    /// Replace the value, returning the previous one
    pub fn set_value(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.value, value)
    }

    /// Load a value and make it the baseline for change tracking
    pub fn load_value(&mut self, value: Value) {
        self.baseline = value.clone();
        self.value = value;
    }

    pub fn has_changes(&self) -> bool {
        self.value != self.baseline
    }
}

/// A value derived from other properties of the same scope
#[derive(Debug, Clone)]
pub struct CalculatedPropertyValue {
    name: PropertyName,
    formula: Formula,
    dependencies: Vec<PropertyName>,
    value_type: Option<ValueType>,
    value: Value,
}

impl CalculatedPropertyValue {
    /// A calculated property that is not part of the descriptor tree
    pub fn new(name: impl Into<PropertyName>, formula: Formula) -> Self {
        Self {
            name: name.into(),
            dependencies: formula.inputs(),
            formula,
            value_type: None,
            value: Value::Null,
        }
    }

    /// Build from a descriptor; `None` if the descriptor has no formula
    pub fn from_descriptor(descriptor: &PropertyDescriptor) -> Option<Self> {
        let formula = descriptor.formula()?.clone();
        Some(Self {
            name: descriptor.name().clone(),
            formula,
            dependencies: descriptor.dependencies().to_vec(),
            value_type: descriptor.value_type(),
            value: Value::Null,
        })
    }

    pub fn name(&self) -> &PropertyName {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn dependencies(&self) -> &[PropertyName] {
        &self.dependencies
    }

    /// Evaluate the formula against the current scope
    pub fn compute(&self, scope: &dyn ValueLookup) -> Value {
        let computed = self.formula.evaluate(scope);
        match self.value_type {
            Some(value_type) => value_type.normalize(&self.name, computed).unwrap_or_else(|e| {
                warn!("Discarding calculated value for {}: {}", self.name, e);
                Value::Null
            }),
            None => computed,
        }
    }

    fn set_value(&mut self, value: Value) -> Value {
        std::mem::replace(&mut self.value, value)
    }
}

/// One live property of a loaded record
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Stored(StoredPropertyValue),
    Calculated(CalculatedPropertyValue),
    Grid(GridPropertyValue),
}

impl PropertyValue {
    /// Create the runtime variant matching a descriptor
    pub fn from_descriptor(descriptor: &Arc<PropertyDescriptor>) -> Result<Self> {
        if descriptor.is_grid() {
            return Ok(PropertyValue::Grid(GridPropertyValue::new(Arc::clone(
                descriptor,
            ))?));
        }
        if descriptor.is_group() {
            return Err(ModelError::InvalidSchema(format!(
                "group {} cannot hold a value",
                descriptor.name()
            )));
        }
        Ok(match CalculatedPropertyValue::from_descriptor(descriptor) {
            Some(calculated) => PropertyValue::Calculated(calculated),
            None => PropertyValue::Stored(StoredPropertyValue::new(Arc::clone(descriptor))),
        })
    }

    pub fn name(&self) -> &PropertyName {
        match self {
            PropertyValue::Stored(p) => p.name(),
            PropertyValue::Calculated(p) => p.name(),
            PropertyValue::Grid(p) => p.name(),
        }
    }

    /// Current value; grids report their rows as a materialized row set
    pub fn value(&self) -> Value {
        match self {
            PropertyValue::Stored(p) => p.value().clone(),
            PropertyValue::Calculated(p) => p.value().clone(),
            PropertyValue::Grid(p) => p.value(),
        }
    }

    /// Names whose change must trigger this property's recompute
    pub fn dependencies(&self) -> &[PropertyName] {
        match self {
            PropertyValue::Stored(p) => p.descriptor().dependencies(),
            PropertyValue::Calculated(p) => p.dependencies(),
            PropertyValue::Grid(p) => p.descriptor().dependencies(),
        }
    }

    pub fn is_calculated(&self) -> bool {
        matches!(self, PropertyValue::Calculated(_))
    }

    pub fn is_read_only_for_user(&self) -> bool {
        match self {
            PropertyValue::Stored(p) => p.descriptor().is_read_only(),
            PropertyValue::Calculated(_) | PropertyValue::Grid(_) => true,
        }
    }

    pub fn has_changes(&self) -> bool {
        match self {
            PropertyValue::Stored(p) => p.has_changes(),
            PropertyValue::Calculated(_) => false,
            PropertyValue::Grid(p) => p.has_changes(),
        }
    }

    pub fn as_grid(&self) -> Option<&GridPropertyValue> {
        match self {
            PropertyValue::Grid(grid) => Some(grid),
            _ => None,
        }
    }

    pub fn as_grid_mut(&mut self) -> Option<&mut GridPropertyValue> {
        match self {
            PropertyValue::Grid(grid) => Some(grid),
            _ => None,
        }
    }

    /// React to `changed` having a new value
    ///
    /// Returns the value this property should take, or `None` if the variant
    /// does not derive its value from other properties.
    pub fn on_dependency_changed(
        &self,
        scope: &dyn ValueLookup,
        changed: &PropertyName,
    ) -> Option<Value> {
        match self {
            PropertyValue::Calculated(p) => {
                tracing::trace!("Recomputing {} because {} changed", p.name(), changed);
                Some(p.compute(scope))
            }
            PropertyValue::Stored(_) | PropertyValue::Grid(_) => None,
        }
    }

    /// Store a recomputed value; returns the old value if it differs
    pub(crate) fn apply_computed(&mut self, value: Value) -> Option<Value> {
        match self {
            PropertyValue::Calculated(p) if *p.value() != value => Some(p.set_value(value)),
            _ => None,
        }
    }
}
