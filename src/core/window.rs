//! Window model: one live record session over a data source
//!
//! The model binds a descriptor tree to a [`ModelDataSource`], keeps the
//! current record in a [`PropertyValueCollection`] and tells subscribers
//! about every change through its [`ModelEventDispatcher`].

use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};
use ulid::Ulid;

use crate::core::collection::{PropertyChange, PropertyValueCollection};
use crate::core::datasource::{ModelDataSource, ModelDataSourceFactory, SaveResult};
use crate::core::descriptor::PropertyDescriptor;
use crate::core::error::{ModelError, Result};
use crate::core::events::{ListenerId, ModelEvent, ModelEventDispatcher};
use crate::core::formula::Formula;
use crate::core::property::{CalculatedPropertyValue, GridPropertyValue, GridRowId, PropertyValue};
use crate::core::value::{PropertyName, PropertyValues, Value};

/// Built-in calculated property holding the window title
pub const WINDOW_TITLE: &str = "WindowTitle";
/// Built-in calculated property holding a one-line record summary
pub const RECORD_SUMMARY: &str = "RecordSummary";
/// Built-in calculated property holding a secondary record summary
pub const RECORD_ADDITIONAL_SUMMARY: &str = "RecordAdditionalSummary";

/// Position of the current record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordIndex {
    /// No record loaded yet
    #[default]
    Unknown,
    /// A blank record that has not been saved
    New,
    /// The record at this position of the data source's list
    Loaded(usize),
}

impl fmt::Display for RecordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordIndex::Unknown => f.write_str("unknown"),
            RecordIndex::New => f.write_str("new"),
            RecordIndex::Loaded(index) => write!(f, "{}", index),
        }
    }
}

/// What navigation does when the current record has unsaved changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnChangesFound {
    /// Drop the changes and move
    #[default]
    Discard,
    /// Stay, and post [`ModelEvent::ConfirmDiscardChanges`]
    Ask,
}

/// Outcome of a navigation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(usize),
    /// Unsaved changes were found and the caller asked to be consulted
    ConfirmationRequired,
}

/// Templates of the built-in title and summary properties
///
/// Templates use `{{ Name }}` placeholders that must name properties of the root
/// scope. Without a title template the root caption is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSummaries {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub additional_summary: Option<String>,
}

/// One record session
pub struct WindowModel {
    id: String,
    descriptor: Option<Arc<PropertyDescriptor>>,
    summaries: WindowSummaries,
    properties: Option<PropertyValueCollection>,
    factory: Option<Arc<dyn ModelDataSourceFactory>>,
    data_source: OnceLock<Box<dyn ModelDataSource>>,
    record_index: RecordIndex,
    record_index_prev: RecordIndex,
    events: ModelEventDispatcher,
}

impl Default for WindowModel {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowModel {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            descriptor: None,
            summaries: WindowSummaries::default(),
            properties: None,
            factory: None,
            data_source: OnceLock::new(),
            record_index: RecordIndex::Unknown,
            record_index_prev: RecordIndex::Unknown,
            events: ModelEventDispatcher::new(),
        }
    }

    /// Create data sources through `factory` when first needed
    pub fn with_factory(mut self, factory: Arc<dyn ModelDataSourceFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Templates for the built-in properties; takes effect on the next
    /// schema assignment
    pub fn with_summaries(mut self, summaries: WindowSummaries) -> Self {
        self.summaries = summaries;
        self
    }

    /// Unique id of this session, carried by every event
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> Option<&Arc<PropertyDescriptor>> {
        self.descriptor.as_ref()
    }

    pub fn record_index(&self) -> RecordIndex {
        self.record_index
    }

    pub fn is_new_record(&self) -> bool {
        self.record_index == RecordIndex::New
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&ModelEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn subscribe_channel(&mut self) -> (ListenerId, Receiver<ModelEvent>) {
        self.events.subscribe_channel()
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Bind the session to a descriptor tree
    ///
    /// Assigning the same descriptor again does nothing. Otherwise the
    /// property collection is rebuilt, then the first record is loaded, or a
    /// new blank record is entered when there are none.
    pub fn assign_schema(&mut self, descriptor: Arc<PropertyDescriptor>) -> Result<()> {
        if let Some(current) = &self.descriptor {
            if Arc::ptr_eq(current, &descriptor) {
                return Ok(());
            }
            // The old data source serves the old schema
            if self.factory.is_some() {
                self.data_source = OnceLock::new();
            }
        }

        let properties = self.build_properties(&descriptor)?;
        debug!(
            "Assigned schema {} to window {} ({} properties)",
            descriptor.name(),
            self.id,
            properties.len()
        );
        self.descriptor = Some(descriptor);
        self.properties = Some(properties);
        self.record_index = RecordIndex::Unknown;
        self.record_index_prev = RecordIndex::Unknown;
        self.load_initial_record()
    }

    /// Replace the data source; the first record is reloaded if a schema is
    /// already assigned
    pub fn set_data_source(&mut self, data_source: Box<dyn ModelDataSource>) -> Result<()> {
        self.data_source = OnceLock::from(data_source);
        if self.properties.is_some() {
            self.record_index = RecordIndex::Unknown;
            self.load_initial_record()?;
        }
        Ok(())
    }

    fn build_properties(&self, descriptor: &PropertyDescriptor) -> Result<PropertyValueCollection> {
        let title = self
            .summaries
            .title
            .clone()
            .unwrap_or_else(|| descriptor.caption().to_string());
        let mut builder = PropertyValueCollection::builder(descriptor.name().clone())
            .add_property(PropertyValue::Calculated(CalculatedPropertyValue::new(
                WINDOW_TITLE,
                Formula::template(&title)?,
            )));
        for (name, template) in [
            (RECORD_SUMMARY, &self.summaries.summary),
            (RECORD_ADDITIONAL_SUMMARY, &self.summaries.additional_summary),
        ] {
            let formula = Formula::template(template.as_deref().unwrap_or_default())?;
            builder = builder.add_property(PropertyValue::Calculated(CalculatedPropertyValue::new(
                name, formula,
            )));
        }
        builder.add_scope(descriptor)?.build()
    }

    fn load_initial_record(&mut self) -> Result<()> {
        if self.data_source()?.records_count()? > 0 {
            self.set_record_index_and_reload(RecordIndex::Loaded(0))
        } else {
            self.set_record_index_and_reload(RecordIndex::New)
        }
    }

    fn data_source(&self) -> Result<&dyn ModelDataSource> {
        if let Some(data_source) = self.data_source.get() {
            return Ok(data_source.as_ref());
        }
        let descriptor = self.descriptor.as_ref().ok_or(ModelError::SchemaNotAssigned)?;
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| ModelError::IllegalState("no data source configured".to_string()))?;
        let created = factory.create(descriptor)?;
        debug!("Created data source for window {}", self.id);
        Ok(self.data_source.get_or_init(|| created).as_ref())
    }

    fn data_source_mut(&mut self) -> Result<&mut Box<dyn ModelDataSource>> {
        self.data_source()?;
        self.data_source
            .get_mut()
            .ok_or_else(|| ModelError::IllegalState("no data source configured".to_string()))
    }

    fn properties(&self) -> Result<&PropertyValueCollection> {
        self.properties.as_ref().ok_or(ModelError::SchemaNotAssigned)
    }

    fn properties_mut(&mut self) -> Result<&mut PropertyValueCollection> {
        self.properties.as_mut().ok_or(ModelError::SchemaNotAssigned)
    }

    /// The live values of the current record
    pub fn property_values(&self) -> Result<&PropertyValueCollection> {
        self.properties()
    }

    fn set_record_index_and_reload(&mut self, index: RecordIndex) -> Result<()> {
        let values = match index {
            RecordIndex::Unknown => {
                return Err(ModelError::IllegalState(
                    "cannot load an unknown record index".to_string(),
                ))
            }
            RecordIndex::New => PropertyValues::new(),
            RecordIndex::Loaded(i) => {
                trace!("Loading current record ({})", i);
                self.data_source()?.record(i)?
            }
        };

        if self.record_index != RecordIndex::New || index != RecordIndex::New {
            self.record_index_prev = self.record_index;
        }
        self.record_index = index;
        self.load_record(&values)
    }

    fn load_record(&mut self, values: &PropertyValues) -> Result<()> {
        self.properties_mut()?.set_values_from_map(values)?;
        trace!("Loaded record {} of window {}", self.record_index, self.id);
        self.events.post(ModelEvent::AllPropertiesChanged {
            model_id: self.id.clone(),
        });
        Ok(())
    }

    pub fn has_changes(&self) -> bool {
        self.properties
            .as_ref()
            .is_some_and(PropertyValueCollection::has_changes)
    }

    pub fn has_previous_record(&self) -> bool {
        matches!(self.record_index, RecordIndex::Loaded(i) if i > 0)
    }

    pub fn has_next_record(&self) -> Result<bool> {
        match self.record_index {
            RecordIndex::Loaded(i) => Ok(i + 1 < self.data_source()?.records_count()?),
            RecordIndex::New | RecordIndex::Unknown => Ok(false),
        }
    }

    /// Number of records in the data source's list
    pub fn records_count(&self) -> Result<usize> {
        self.properties()?;
        self.data_source()?.records_count()
    }

    /// Move straight to the record at `index`
    pub fn go_to_record(&mut self, index: usize, on_changes: OnChangesFound) -> Result<Navigation> {
        if index >= self.records_count()? {
            return Err(ModelError::InvalidRecordIndex(index));
        }
        self.navigate(index, on_changes)
    }

    pub fn next_record(&mut self, on_changes: OnChangesFound) -> Result<Navigation> {
        if !self.has_next_record()? {
            return Err(ModelError::IllegalState("there is no next record".to_string()));
        }
        let RecordIndex::Loaded(index) = self.record_index else {
            return Err(ModelError::IllegalState("there is no next record".to_string()));
        };
        self.navigate(index + 1, on_changes)
    }

    pub fn previous_record(&mut self, on_changes: OnChangesFound) -> Result<Navigation> {
        let RecordIndex::Loaded(index) = self.record_index else {
            return Err(ModelError::IllegalState(
                "there is no previous record".to_string(),
            ));
        };
        if index == 0 {
            return Err(ModelError::IllegalState(
                "there is no previous record".to_string(),
            ));
        }
        self.navigate(index - 1, on_changes)
    }

    fn navigate(&mut self, target: usize, on_changes: OnChangesFound) -> Result<Navigation> {
        if on_changes == OnChangesFound::Ask && self.has_changes() {
            debug!("Window {} has unsaved changes, asking before moving", self.id);
            self.events.post(ModelEvent::ConfirmDiscardChanges {
                model_id: self.id.clone(),
            });
            return Ok(Navigation::ConfirmationRequired);
        }
        self.set_record_index_and_reload(RecordIndex::Loaded(target))?;
        Ok(Navigation::Moved(target))
    }

    /// Enter a new blank record
    pub fn new_record(&mut self) -> Result<()> {
        self.properties()?;
        self.set_record_index_and_reload(RecordIndex::New)
    }

    /// Enter a new record pre-filled from an existing one
    ///
    /// Each value goes through [`WindowModel::set_property`], so read-only
    /// properties such as the key are not copied.
    pub fn new_record_as_copy_by_id(&mut self, id: &Value) -> Result<()> {
        self.new_record()?;
        let values = self
            .data_source()?
            .retrieve_record_by_id(id)?
            .ok_or_else(|| ModelError::RecordNotFound(id.to_string()))?;
        for (name, value) in values {
            if self.properties()?.get_property_value_or_null(name.as_str()).is_none() {
                trace!("Skip copying {} because it is not a property of this window", name);
                continue;
            }
            self.set_property(name.as_str(), value)?;
        }
        Ok(())
    }

    /// Persist the current record and reload it from the data source
    pub fn save_record(&mut self) -> Result<SaveResult> {
        let index = match self.record_index {
            RecordIndex::Loaded(i) => Some(i),
            RecordIndex::New => None,
            RecordIndex::Unknown => return Err(ModelError::SchemaNotAssigned),
        };
        let values = self.properties()?.get_values_as_map();
        let result = self.data_source_mut()?.save_record(index, &values)?;
        debug!(
            "Saved record {} of window {} at index {}",
            result.record_id, self.id, result.record_index
        );
        self.set_record_index_and_reload(RecordIndex::Loaded(result.record_index))?;
        Ok(result)
    }

    /// Drop unsaved edits
    ///
    /// A new record goes back to the record shown before it; a loaded record
    /// is reloaded from the data source.
    pub fn cancel_record_editing(&mut self) -> Result<()> {
        let target = match self.record_index {
            RecordIndex::New => match self.record_index_prev {
                RecordIndex::Loaded(i) => RecordIndex::Loaded(i),
                RecordIndex::New | RecordIndex::Unknown => RecordIndex::New,
            },
            RecordIndex::Loaded(i) => RecordIndex::Loaded(i),
            RecordIndex::Unknown => return Err(ModelError::SchemaNotAssigned),
        };
        self.set_record_index_and_reload(target)
    }

    pub fn get_property(&self, name: &str) -> Result<Value> {
        Ok(self.properties()?.get_property_value(name)?.value())
    }

    pub fn get_property_or_null(&self, name: &str) -> Value {
        self.properties
            .as_ref()
            .and_then(|p| p.get_property_value_or_null(name))
            .map(PropertyValue::value)
            .unwrap_or_default()
    }

    /// Whether users may not set this property
    pub fn is_read_only_for_user(&self, name: &str) -> Result<bool> {
        Ok(self.properties()?.get_property_value(name)?.is_read_only_for_user())
    }

    /// Set a root property and propagate to its dependents
    ///
    /// Read-only properties are left untouched.
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        trace!("Setting property: {}={:?}", name, value);
        let property = self.properties()?.get_property_value(name)?;
        if property.is_read_only_for_user() {
            trace!("Skip setting property {} because it is read-only for user", name);
            return Ok(());
        }

        let changes = self.properties_mut()?.set_value(name, value)?;
        self.post_property_changes(changes);
        Ok(())
    }

    fn post_property_changes(&mut self, changes: Vec<PropertyChange>) {
        let model_id = &self.id;
        let events: Vec<ModelEvent> = changes
            .into_iter()
            .map(|change| ModelEvent::PropertyChanged {
                model_id: model_id.clone(),
                name: change.name,
                value: change.value,
                old_value: change.old_value,
            })
            .collect();
        self.events.post_all(events);
    }

    fn grid(&self, grid: &str) -> Result<&GridPropertyValue> {
        self.properties()?.grid(grid)
    }

    fn grid_mut(&mut self, grid: &str) -> Result<&mut GridPropertyValue> {
        self.properties_mut()?.grid_mut(grid)
    }

    /// Set a value in one grid row; dependents are recomputed within the row
    pub fn set_grid_property(
        &mut self,
        grid: &str,
        row_id: GridRowId,
        name: &str,
        value: Value,
    ) -> Result<()> {
        trace!("Setting grid property {}, {}: {}={:?}", grid, row_id, name, value);
        let row = self.grid(grid)?.row(row_id)?;
        if row.properties().get_property_value(name)?.is_read_only_for_user() {
            trace!(
                "Skip setting grid property {}.{} because it is read-only for user",
                grid,
                name
            );
            return Ok(());
        }

        let (_, changes) = self.grid_mut(grid)?.set_value_at(row_id, name, value)?;
        let grid_name = PropertyName::from(grid);
        let model_id = &self.id;
        let events: Vec<ModelEvent> = changes
            .into_iter()
            .map(|change| ModelEvent::GridPropertyChanged {
                model_id: model_id.clone(),
                grid: grid_name.clone(),
                row_id,
                name: change.name,
                value: change.value,
                old_value: change.old_value,
            })
            .collect();
        self.events.post_all(events);
        Ok(())
    }

    pub fn get_grid_property(&self, grid: &str, row_id: GridRowId, name: &str) -> Result<Value> {
        self.grid(grid)?.get_value_at(row_id, name)
    }

    /// Rows of a grid, in order
    pub fn grid_row_ids(&self, grid: &str) -> Result<Vec<GridRowId>> {
        Ok(self.grid(grid)?.rows().iter().map(|row| row.row_id()).collect())
    }

    /// Append a row seeded with defaults and return its id
    pub fn grid_new_row(&mut self, grid: &str) -> Result<GridRowId> {
        let row = self.grid_mut(grid)?.new_row();
        let row_id = row.row_id();
        let values = row.values_as_map();
        self.events.post(ModelEvent::GridRowAdded {
            model_id: self.id.clone(),
            grid: PropertyName::from(grid),
            row_id,
            values,
        });
        Ok(row_id)
    }

    pub fn grid_remove_row(&mut self, grid: &str, row_id: GridRowId) -> Result<()> {
        self.grid_mut(grid)?.remove_row(row_id)?;
        self.events.post(ModelEvent::GridRowRemoved {
            model_id: self.id.clone(),
            grid: PropertyName::from(grid),
            row_id,
        });
        Ok(())
    }

    /// Values of the selected properties; unknown names are skipped
    pub fn get_property_values<'a, I>(&self, selected: I) -> Result<PropertyValues>
    where
        I: IntoIterator<Item = &'a PropertyName>,
    {
        Ok(self.properties()?.get_values_as_map_for(selected))
    }
}

impl fmt::Debug for WindowModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowModel")
            .field("id", &self.id)
            .field("schema", &self.descriptor.as_ref().map(|d| d.name()))
            .field("record_index", &self.record_index)
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::datasource::MemoryDataSource;
    use crate::core::descriptor::ColumnBinding;
    use crate::core::value::{LookupValue, ValueType};
    use std::sync::mpsc::Receiver;

    fn order() -> Arc<PropertyDescriptor> {
        PropertyDescriptor::group("Order")
            .caption("Sales Order")
            .table("c_order")
            .child(
                PropertyDescriptor::value("OrderId", ValueType::Identifier)
                    .column(ColumnBinding::new("c_order_id").key())
                    .build(),
            )
            .child(PropertyDescriptor::value("Qty", ValueType::Integer).build())
            .child(PropertyDescriptor::value("Price", ValueType::Integer).build())
            .child(
                PropertyDescriptor::value("Total", ValueType::Integer)
                    .formula(Formula::product(["Qty", "Price"]))
                    .build(),
            )
            .child(PropertyDescriptor::value("Note", ValueType::Text).build())
            .child(
                PropertyDescriptor::grid("Lines", "c_orderline")
                    .child(
                        PropertyDescriptor::value("LineQty", ValueType::Integer)
                            .default_value(1)
                            .build(),
                    )
                    .child(PropertyDescriptor::value("LinePrice", ValueType::Integer).build())
                    .child(
                        PropertyDescriptor::value("LineNet", ValueType::Integer)
                            .formula(Formula::product(["LineQty", "LinePrice"]))
                            .build(),
                    )
                    .build(),
            )
            .child(
                PropertyDescriptor::grid("Taxes", "c_ordertax")
                    .child(PropertyDescriptor::value("Rate", ValueType::Integer).build())
                    .build(),
            )
            .build()
    }

    fn record(qty: i64, price: i64) -> PropertyValues {
        let mut values = PropertyValues::new();
        values.insert("Qty".into(), Value::Integer(qty));
        values.insert("Price".into(), Value::Integer(price));
        values
    }

    fn model_with(records: Vec<PropertyValues>) -> (WindowModel, Receiver<ModelEvent>) {
        let mut ds = MemoryDataSource::new("OrderId");
        for values in records {
            ds = ds.with_record(values);
        }
        let mut model = WindowModel::new();
        model.set_data_source(Box::new(ds)).unwrap();
        let (_, events) = model.subscribe_channel();
        model.assign_schema(order()).unwrap();
        (model, events)
    }

    fn property_events(events: &Receiver<ModelEvent>) -> Vec<(String, Value, Value)> {
        events
            .try_iter()
            .filter_map(|event| match event {
                ModelEvent::PropertyChanged {
                    name,
                    value,
                    old_value,
                    ..
                } => Some((name.to_string(), old_value, value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_assign_schema_enters_new_without_records() {
        let (model, events) = model_with(vec![]);
        assert_eq!(model.record_index(), RecordIndex::New);
        assert!(model.is_new_record());
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![ModelEvent::AllPropertiesChanged {
                model_id: model.id().to_string()
            }]
        );
        assert_eq!(model.get_property(WINDOW_TITLE).unwrap(), Value::text("Sales Order"));
    }

    #[test]
    fn test_assign_schema_is_idempotent() {
        let descriptor = order();
        let mut model = WindowModel::new();
        model
            .set_data_source(Box::new(MemoryDataSource::new("OrderId").with_record(record(1, 2))))
            .unwrap();
        model.assign_schema(Arc::clone(&descriptor)).unwrap();
        model.set_property("Qty", Value::Integer(5)).unwrap();

        model.assign_schema(descriptor).unwrap();
        assert_eq!(model.get_property("Qty").unwrap(), Value::Integer(5));
    }

    #[test]
    fn test_qty_price_total_scenario() {
        let (mut model, events) = model_with(vec![]);
        events.try_iter().count();

        model.set_property("Qty", Value::Integer(2)).unwrap();
        model.set_property("Price", Value::Integer(5)).unwrap();

        assert_eq!(model.get_property("Total").unwrap(), Value::Integer(10));
        assert_eq!(
            property_events(&events),
            vec![
                ("Qty".to_string(), Value::Null, Value::Integer(2)),
                ("Total".to_string(), Value::Null, Value::Integer(0)),
                ("Price".to_string(), Value::Null, Value::Integer(5)),
                ("Total".to_string(), Value::Integer(0), Value::Integer(10)),
            ]
        );
    }

    #[test]
    fn test_setting_the_current_lookup_key_is_not_a_change() {
        let root = PropertyDescriptor::group("Order")
            .table("c_order")
            .child(
                PropertyDescriptor::value("OrderId", ValueType::Identifier)
                    .column(ColumnBinding::new("c_order_id").key())
                    .build(),
            )
            .child(PropertyDescriptor::value("Partner", ValueType::Lookup).build())
            .build();
        let mut values = PropertyValues::new();
        values.insert("Partner".into(), Value::Lookup(LookupValue::of_id(2, "Globex")));
        let mut model = WindowModel::new();
        model
            .set_data_source(Box::new(MemoryDataSource::new("OrderId").with_record(values)))
            .unwrap();
        model.assign_schema(root).unwrap();
        let (_, events) = model.subscribe_channel();

        model.set_property("Partner", Value::Integer(2)).unwrap();
        assert!(property_events(&events).is_empty());
        assert!(!model.has_changes());
        match model.get_property("Partner").unwrap() {
            Value::Lookup(lookup) => assert_eq!(lookup.display, "Globex"),
            other => panic!("unexpected value: {other:?}"),
        }

        model.set_property("Partner", Value::Integer(3)).unwrap();
        assert_eq!(property_events(&events).len(), 1);
        assert!(model.has_changes());
    }

    #[test]
    fn test_property_without_dependents_emits_one_event() {
        let (mut model, events) = model_with(vec![record(1, 1)]);
        events.try_iter().count();

        model.set_property("Note", Value::text("rush")).unwrap();
        assert_eq!(model.get_property("Note").unwrap(), Value::text("rush"));
        assert_eq!(property_events(&events).len(), 1);

        model.set_property("Note", Value::text("rush")).unwrap();
        assert!(property_events(&events).is_empty());
    }

    #[test]
    fn test_read_only_properties_are_skipped() {
        let (mut model, events) = model_with(vec![record(2, 3)]);
        events.try_iter().count();

        model.set_property("Total", Value::Integer(99)).unwrap();
        model.set_property("OrderId", Value::Integer(42)).unwrap();
        assert_eq!(model.get_property("Total").unwrap(), Value::Integer(6));
        assert_eq!(model.get_property("OrderId").unwrap(), Value::Integer(1));
        assert!(property_events(&events).is_empty());
    }

    #[test]
    fn test_unknown_property_fails() {
        let (mut model, _) = model_with(vec![]);
        assert!(matches!(
            model.set_property("Nope", Value::Integer(1)).unwrap_err(),
            ModelError::PropertyNotFound { .. }
        ));
        assert_eq!(model.get_property_or_null("Nope"), Value::Null);
    }

    #[test]
    fn test_navigation_bounds() {
        let (mut model, _) = model_with(vec![record(1, 1), record(2, 2), record(3, 3)]);
        assert_eq!(model.record_index(), RecordIndex::Loaded(0));
        assert!(!model.has_previous_record());
        assert!(model.has_next_record().unwrap());

        model.next_record(OnChangesFound::Discard).unwrap();
        assert!(model.has_previous_record());
        assert_eq!(
            model.next_record(OnChangesFound::Discard).unwrap(),
            Navigation::Moved(2)
        );
        assert_eq!(model.get_property("Qty").unwrap(), Value::Integer(3));
        assert!(!model.has_next_record().unwrap());
        assert!(matches!(
            model.next_record(OnChangesFound::Discard).unwrap_err(),
            ModelError::IllegalState(_)
        ));

        model.previous_record(OnChangesFound::Discard).unwrap();
        assert_eq!(model.record_index(), RecordIndex::Loaded(1));
    }

    #[test]
    fn test_go_to_record() {
        let (mut model, _) = model_with(vec![record(1, 1), record(2, 2), record(3, 3)]);
        assert_eq!(model.records_count().unwrap(), 3);
        assert_eq!(
            model.go_to_record(2, OnChangesFound::Discard).unwrap(),
            Navigation::Moved(2)
        );
        assert_eq!(model.get_property("Price").unwrap(), Value::Integer(3));
        assert!(matches!(
            model.go_to_record(3, OnChangesFound::Discard).unwrap_err(),
            ModelError::InvalidRecordIndex(3)
        ));
        assert_eq!(model.record_index(), RecordIndex::Loaded(2));
    }

    #[test]
    fn test_ask_policy_requires_confirmation() {
        let (mut model, events) = model_with(vec![record(1, 1), record(2, 2)]);
        model.set_property("Qty", Value::Integer(7)).unwrap();
        events.try_iter().count();

        let outcome = model.next_record(OnChangesFound::Ask).unwrap();
        assert_eq!(outcome, Navigation::ConfirmationRequired);
        assert_eq!(model.record_index(), RecordIndex::Loaded(0));
        assert!(events
            .try_iter()
            .any(|e| matches!(e, ModelEvent::ConfirmDiscardChanges { .. })));

        assert_eq!(
            model.next_record(OnChangesFound::Discard).unwrap(),
            Navigation::Moved(1)
        );
    }

    #[test]
    fn test_save_round_trip() {
        let (mut model, _) = model_with(vec![record(1, 1)]);
        model.new_record().unwrap();
        model.set_property("Qty", Value::Integer(4)).unwrap();
        model.set_property("Price", Value::Integer(6)).unwrap();
        model.set_property("Note", Value::text("fresh")).unwrap();
        assert!(model.has_changes());

        let saved = model.save_record().unwrap();
        assert_eq!(saved.record_index, 1);
        assert_eq!(model.record_index(), RecordIndex::Loaded(1));
        assert!(!model.has_changes());

        model.previous_record(OnChangesFound::Discard).unwrap();
        model.next_record(OnChangesFound::Discard).unwrap();
        assert_eq!(model.get_property("Qty").unwrap(), Value::Integer(4));
        assert_eq!(model.get_property("Price").unwrap(), Value::Integer(6));
        assert_eq!(model.get_property("Note").unwrap(), Value::text("fresh"));
        assert_eq!(model.get_property("Total").unwrap(), Value::Integer(24));
        assert_eq!(model.get_property("OrderId").unwrap(), saved.record_id);
    }

    #[test]
    fn test_cancel_new_returns_to_previous_record() {
        let (mut model, _) = model_with(vec![record(1, 1), record(2, 2)]);
        model.next_record(OnChangesFound::Discard).unwrap();
        model.new_record().unwrap();
        model.new_record().unwrap();
        model.set_property("Qty", Value::Integer(9)).unwrap();

        model.cancel_record_editing().unwrap();
        assert_eq!(model.record_index(), RecordIndex::Loaded(1));
        assert_eq!(model.get_property("Qty").unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_cancel_loaded_discards_edits() {
        let (mut model, _) = model_with(vec![record(1, 1)]);
        model.set_property("Qty", Value::Integer(9)).unwrap();
        model.cancel_record_editing().unwrap();
        assert_eq!(model.get_property("Qty").unwrap(), Value::Integer(1));
        assert!(!model.has_changes());
    }

    #[test]
    fn test_new_record_as_copy_skips_key() {
        let (mut model, events) = model_with(vec![record(3, 4)]);
        events.try_iter().count();

        model.new_record_as_copy_by_id(&Value::Integer(1)).unwrap();
        assert!(model.is_new_record());
        assert_eq!(model.get_property("Qty").unwrap(), Value::Integer(3));
        assert_eq!(model.get_property("Total").unwrap(), Value::Integer(12));
        assert_eq!(model.get_property("OrderId").unwrap(), Value::Null);
        assert!(!property_events(&events).is_empty());

        assert!(matches!(
            model.new_record_as_copy_by_id(&Value::Integer(99)).unwrap_err(),
            ModelError::RecordNotFound(_)
        ));
    }

    #[test]
    fn test_grid_rows_and_events() {
        let (mut model, events) = model_with(vec![]);
        events.try_iter().count();

        let line = model.grid_new_row("Lines").unwrap();
        let tax = model.grid_new_row("Taxes").unwrap();
        let second = model.grid_new_row("Lines").unwrap();
        assert_ne!(line, tax);
        assert_ne!(line, second);
        assert_eq!(model.get_grid_property("Lines", line, "LineQty").unwrap(), Value::Integer(1));

        model
            .set_grid_property("Lines", line, "LinePrice", Value::Integer(8))
            .unwrap();
        assert_eq!(model.get_grid_property("Lines", line, "LineNet").unwrap(), Value::Integer(8));

        let grid_events: Vec<ModelEvent> = events.try_iter().collect();
        assert!(matches!(&grid_events[0], ModelEvent::GridRowAdded { values, .. } if values["LineQty"] == Value::Integer(1)));
        let changed: Vec<&str> = grid_events
            .iter()
            .filter_map(|e| match e {
                ModelEvent::GridPropertyChanged { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(changed, vec!["LinePrice", "LineNet"]);

        model.grid_remove_row("Lines", line).unwrap();
        assert_eq!(model.grid_row_ids("Lines").unwrap(), vec![second]);
        assert!(matches!(
            model.get_grid_property("Lines", line, "LineQty").unwrap_err(),
            ModelError::GridRowNotFound { .. }
        ));
        assert!(matches!(
            model.grid_new_row("Qty").unwrap_err(),
            ModelError::NotAGrid { .. }
        ));
    }

    #[test]
    fn test_grid_rows_survive_save() {
        let (mut model, _) = model_with(vec![]);
        let row = model.grid_new_row("Lines").unwrap();
        model
            .set_grid_property("Lines", row, "LinePrice", Value::Integer(3))
            .unwrap();
        model.save_record().unwrap();

        let rows = model.grid_row_ids("Lines").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            model.get_grid_property("Lines", rows[0], "LineNet").unwrap(),
            Value::Integer(3)
        );
    }

    #[test]
    fn test_selected_values() {
        let (model, _) = model_with(vec![record(2, 5)]);
        let selected = [PropertyName::from("Total"), PropertyName::from("Missing")];
        let values = model.get_property_values(&selected).unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values["Total"], Value::Integer(10));
    }

    #[test]
    fn test_summary_templates() {
        let mut ds = MemoryDataSource::new("OrderId");
        ds = ds.with_record(record(2, 5));
        let mut model = WindowModel::new().with_summaries(WindowSummaries {
            title: Some("Order {{ OrderId }}".to_string()),
            summary: Some("{{ Qty }} x {{ Price }}".to_string()),
            additional_summary: None,
        });
        model.set_data_source(Box::new(ds)).unwrap();
        model.assign_schema(order()).unwrap();

        assert_eq!(model.get_property(WINDOW_TITLE).unwrap(), Value::text("Order 1"));
        assert_eq!(model.get_property(RECORD_SUMMARY).unwrap(), Value::text("2 x 5"));
        assert_eq!(model.get_property(RECORD_ADDITIONAL_SUMMARY).unwrap(), Value::Null);
    }

    #[test]
    fn test_factory_creates_data_source_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = move |_: &Arc<PropertyDescriptor>| -> Result<Box<dyn ModelDataSource>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MemoryDataSource::new("OrderId").with_record(record(1, 1))))
        };
        let mut model = WindowModel::new().with_factory(Arc::new(factory));
        model.assign_schema(order()).unwrap();
        model.has_next_record().unwrap();
        model.save_record().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_operations_require_schema() {
        let mut model = WindowModel::new();
        assert!(matches!(
            model.get_property("Qty").unwrap_err(),
            ModelError::SchemaNotAssigned
        ));
        assert!(matches!(
            model.save_record().unwrap_err(),
            ModelError::SchemaNotAssigned
        ));
    }
}
