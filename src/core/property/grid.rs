//! Grid properties: nested repeating rows, each its own property scope

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::trace;
use ulid::Ulid;

use crate::core::collection::{PropertyChange, PropertyValueCollection};
use crate::core::descriptor::PropertyDescriptor;
use crate::core::error::{ModelError, Result};
use crate::core::value::{PropertyName, PropertyValues, RowSet, Value};

/// Identifier of a grid row, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridRowId(Ulid);

impl GridRowId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for GridRowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GridRowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GridRowId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ulid::from_string(s).map(GridRowId)
    }
}

/// One row of a grid
#[derive(Debug, Clone)]
pub struct GridRow {
    row_id: GridRowId,
    properties: PropertyValueCollection,
}

impl GridRow {
    pub fn row_id(&self) -> GridRowId {
        self.row_id
    }

    pub fn properties(&self) -> &PropertyValueCollection {
        &self.properties
    }

    pub fn values_as_map(&self) -> PropertyValues {
        self.properties.get_values_as_map()
    }
}

/// A property holding an ordered sequence of rows
#[derive(Debug, Clone)]
pub struct GridPropertyValue {
    descriptor: Arc<PropertyDescriptor>,
    template: PropertyValueCollection,
    rows: Vec<GridRow>,
    rows_changed: bool,
}

impl GridPropertyValue {
    /// Create an empty grid; fails if the row scope is invalid
    pub fn new(descriptor: Arc<PropertyDescriptor>) -> Result<Self> {
        let mut template = PropertyValueCollection::builder(descriptor.name().clone())
            .add_scope(&descriptor)?
            .build()?;
        template.set_values_from_map(&PropertyValues::new())?;

        Ok(Self {
            descriptor,
            template,
            rows: Vec::new(),
            rows_changed: false,
        })
    }

    pub fn name(&self) -> &PropertyName {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<PropertyDescriptor> {
        &self.descriptor
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows as a materialized row set
    pub fn value(&self) -> Value {
        Value::Rows(RowSet::loaded(
            self.rows.iter().map(GridRow::values_as_map).collect(),
        ))
    }

    /// Replace all rows with the given loaded rows
    pub(crate) fn load_rows(&mut self, rows: &RowSet) -> Result<()> {
        let loaded = rows.rows()?;
        trace!("Loading {} rows into grid {}", loaded.len(), self.name());
        let mut new_rows = Vec::with_capacity(loaded.len());
        for values in loaded {
            let mut properties = self.template.clone();
            properties.set_values_from_map(values)?;
            new_rows.push(GridRow {
                row_id: GridRowId::new(),
                properties,
            });
        }
        self.rows = new_rows;
        self.rows_changed = false;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
        self.rows_changed = false;
    }

    /// Append a row seeded with the default values of the row scope
    pub fn new_row(&mut self) -> &GridRow {
        let row_id = GridRowId::new();
        trace!("New row {} in grid {}", row_id, self.name());
        self.rows.push(GridRow {
            row_id,
            properties: self.template.clone(),
        });
        self.rows_changed = true;
        &self.rows[self.rows.len() - 1]
    }

    /// Remove a row, returning it
    pub fn remove_row(&mut self, row_id: GridRowId) -> Result<GridRow> {
        let position = self.position(row_id)?;
        self.rows_changed = true;
        Ok(self.rows.remove(position))
    }

    pub fn row(&self, row_id: GridRowId) -> Result<&GridRow> {
        let position = self.position(row_id)?;
        Ok(&self.rows[position])
    }

    pub fn get_value_at(&self, row_id: GridRowId, name: &str) -> Result<Value> {
        Ok(self.row(row_id)?.properties.get_property_value(name)?.value())
    }

    /// Set a value in one row
    ///
    /// Returns the previous value and the row-scoped changes (the edited
    /// property first, then its dependents). No changes means a no-op write.
    pub fn set_value_at(
        &mut self,
        row_id: GridRowId,
        name: &str,
        value: Value,
    ) -> Result<(Value, Vec<PropertyChange>)> {
        let position = self.position(row_id)?;
        let properties = &mut self.rows[position].properties;
        let old_value = properties.get_property_value(name)?.value();
        let changes = properties.set_value(name, value)?;
        Ok((old_value, changes))
    }

    pub fn has_changes(&self) -> bool {
        self.rows_changed || self.rows.iter().any(|row| row.properties.has_changes())
    }

    fn position(&self, row_id: GridRowId) -> Result<usize> {
        self.rows
            .iter()
            .position(|row| row.row_id == row_id)
            .ok_or_else(|| ModelError::GridRowNotFound {
                grid: self.name().clone(),
                row_id: row_id.to_string(),
            })
    }
}
