//! Property value collection - the dependency propagation engine
//!
//! A collection holds one [`PropertyValue`] per declared property of a scope
//! (the record root or one grid row). Setting a value recomputes every
//! property that depends on it, level by level, and reports the changes in
//! the order they happened.
//!
//! The dependency graph is validated when the collection is built: unknown
//! dependency names and cycles are rejected, so propagation always ends.

use std::collections::{BTreeSet, HashMap};

use tracing::{trace, warn};

use crate::core::descriptor::PropertyDescriptor;
use crate::core::error::{ModelError, Result};
use crate::core::formula::ValueLookup;
use crate::core::property::{GridPropertyValue, PropertyValue};
use crate::core::value::{PropertyName, PropertyValues, Value};

/// One observed value change
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: PropertyName,
    pub value: Value,
    pub old_value: Value,
}

/// The live values of one record scope
#[derive(Debug, Clone)]
pub struct PropertyValueCollection {
    scope: PropertyName,
    properties: Vec<PropertyValue>,
    index: HashMap<PropertyName, usize>,
    dependents: HashMap<PropertyName, Vec<PropertyName>>,
    calculation_order: Vec<usize>,
}

impl PropertyValueCollection {
    pub fn builder(scope: impl Into<PropertyName>) -> PropertyValueCollectionBuilder {
        PropertyValueCollectionBuilder {
            scope: scope.into(),
            properties: Vec::new(),
        }
    }

    pub fn scope(&self) -> &PropertyName {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Property names in declaration order
    pub fn property_names(&self) -> impl Iterator<Item = &PropertyName> {
        self.properties.iter().map(PropertyValue::name)
    }

    pub fn property_values(&self) -> &[PropertyValue] {
        &self.properties
    }

    pub fn get_property_value(&self, name: &str) -> Result<&PropertyValue> {
        self.get_property_value_or_null(name)
            .ok_or_else(|| ModelError::not_found(name))
    }

    pub fn get_property_value_or_null(&self, name: &str) -> Option<&PropertyValue> {
        self.index.get(name).map(|&idx| &self.properties[idx])
    }

    pub fn grid(&self, name: &str) -> Result<&GridPropertyValue> {
        self.get_property_value(name)?
            .as_grid()
            .ok_or_else(|| ModelError::NotAGrid { name: name.into() })
    }

    pub fn grid_mut(&mut self, name: &str) -> Result<&mut GridPropertyValue> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| ModelError::not_found(name))?;
        self.properties[idx]
            .as_grid_mut()
            .ok_or_else(|| ModelError::NotAGrid { name: name.into() })
    }

    /// Properties that declare a dependency on `name`, in declaration order
    pub fn get_property_names_which_depend_on(&self, name: &str) -> &[PropertyName] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any stored value or grid differs from what was last loaded
    pub fn has_changes(&self) -> bool {
        self.properties.iter().any(PropertyValue::has_changes)
    }

    /// Load a fresh record
    ///
    /// Every stored property takes the incoming value (its default if
    /// absent), grids are rebuilt from their row sets, and then every
    /// calculated property is recomputed once, inputs before dependents.
    pub fn set_values_from_map(&mut self, values: &PropertyValues) -> Result<()> {
        for property in &mut self.properties {
            match property {
                PropertyValue::Stored(stored) => {
                    let incoming = values
                        .get(stored.name())
                        .cloned()
                        .unwrap_or_else(|| stored.descriptor().default_value().clone());
                    let normalized = stored.normalize(incoming)?;
                    stored.load_value(normalized);
                }
                PropertyValue::Grid(grid) => match values.get(grid.name()) {
                    Some(Value::Rows(rows)) => grid.load_rows(rows)?,
                    None | Some(Value::Null) => grid.clear(),
                    Some(other) => {
                        return Err(ModelError::invalid_value(
                            grid.name(),
                            format!("expected rows, got {:?}", other),
                        ))
                    }
                },
                PropertyValue::Calculated(_) => {}
            }
        }

        self.recalculate_all();
        Ok(())
    }

    /// Recompute every calculated property once, in dependency order
    pub(crate) fn recalculate_all(&mut self) {
        trace!("Recalculating all calculated properties of {}", self.scope);
        for position in 0..self.calculation_order.len() {
            let idx = self.calculation_order[position];
            let name = self.properties[idx].name().clone();
            if let Some(value) = self.properties[idx].on_dependency_changed(&*self, &name) {
                self.properties[idx].apply_computed(value);
            }
        }
    }

    /// Set a stored property and propagate to its dependents
    ///
    /// Returns the changes in emission order: the edited property, then each
    /// level of dependents. Setting a property to its current value returns
    /// no changes.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<Vec<PropertyChange>> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| ModelError::not_found(name))?;

        let (property_name, old_value, new_value) = match &mut self.properties[idx] {
            PropertyValue::Stored(stored) => {
                let normalized = stored.normalize(value)?;
                if *stored.value() == normalized {
                    return Ok(Vec::new());
                }
                let old_value = stored.set_value(normalized.clone());
                (stored.name().clone(), old_value, normalized)
            }
            PropertyValue::Calculated(_) | PropertyValue::Grid(_) => {
                return Err(ModelError::IllegalState(format!(
                    "property {} cannot be set directly",
                    name
                )))
            }
        };
        trace!("Set {}={:?} (was {:?})", property_name, new_value, old_value);

        let mut changes = vec![PropertyChange {
            name: property_name.clone(),
            value: new_value,
            old_value,
        }];
        changes.extend(self.update_all_which_depend_on(&property_name));
        Ok(changes)
    }

    /// Breadth-first recompute of everything downstream of `changed`
    pub fn update_all_which_depend_on(&mut self, changed: &PropertyName) -> Vec<PropertyChange> {
        let mut changes = Vec::new();
        let mut level = vec![changed.clone()];

        while !level.is_empty() {
            let mut next_level: Vec<PropertyName> = Vec::new();
            for trigger in &level {
                let dependents = self
                    .get_property_names_which_depend_on(trigger.as_str())
                    .to_vec();
                for dependent in dependents {
                    let Some(&idx) = self.index.get(&dependent) else {
                        warn!(
                            "Skip updating dependent property {} because it is missing",
                            dependent
                        );
                        continue;
                    };
                    let Some(computed) = self.properties[idx].on_dependency_changed(&*self, trigger)
                    else {
                        continue;
                    };
                    if let Some(old_value) = self.properties[idx].apply_computed(computed.clone()) {
                        trace!("Updated dependent property {}={:?}", dependent, computed);
                        changes.push(PropertyChange {
                            name: dependent.clone(),
                            value: computed,
                            old_value,
                        });
                        if !next_level.contains(&dependent) {
                            next_level.push(dependent);
                        }
                    }
                }
            }
            level = next_level;
        }

        changes
    }

    /// All values, in declaration order
    pub fn get_values_as_map(&self) -> PropertyValues {
        self.properties
            .iter()
            .map(|p| (p.name().clone(), p.value()))
            .collect()
    }

    /// Values of the selected properties; unknown names are skipped
    pub fn get_values_as_map_for<'a, I>(&self, names: I) -> PropertyValues
    where
        I: IntoIterator<Item = &'a PropertyName>,
    {
        let mut values = PropertyValues::new();
        for name in names {
            match self.get_property_value_or_null(name.as_str()) {
                Some(property) => {
                    values.insert(name.clone(), property.value());
                }
                None => trace!("Skipping unknown property {}", name),
            }
        }
        values
    }
}

impl ValueLookup for PropertyValueCollection {
    fn value_of(&self, name: &str) -> Value {
        self.get_property_value_or_null(name)
            .map(PropertyValue::value)
            .unwrap_or_default()
    }
}

/// Collects properties and validates the dependency graph
pub struct PropertyValueCollectionBuilder {
    scope: PropertyName,
    properties: Vec<PropertyValue>,
}

impl PropertyValueCollectionBuilder {
    pub fn add_property(mut self, property: PropertyValue) -> Self {
        self.properties.push(property);
        self
    }

    /// Add every property of a descriptor's scope, groups flattened
    pub fn add_scope(mut self, descriptor: &PropertyDescriptor) -> Result<Self> {
        for child in descriptor.scope_properties() {
            self.properties.push(PropertyValue::from_descriptor(child)?);
        }
        Ok(self)
    }

    pub fn build(self) -> Result<PropertyValueCollection> {
        let mut index = HashMap::with_capacity(self.properties.len());
        for (idx, property) in self.properties.iter().enumerate() {
            if index.insert(property.name().clone(), idx).is_some() {
                return Err(ModelError::DuplicateProperty {
                    scope: self.scope.clone(),
                    name: property.name().clone(),
                });
            }
        }

        let mut dependents: HashMap<PropertyName, Vec<PropertyName>> = HashMap::new();
        for property in &self.properties {
            for dependency in property.dependencies() {
                if !index.contains_key(dependency) {
                    return Err(ModelError::UnknownDependency {
                        property: property.name().clone(),
                        dependency: dependency.clone(),
                    });
                }
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(property.name().clone());
            }
        }

        let order = topological_order(&self.properties, &index)?;
        let calculation_order = order
            .into_iter()
            .filter(|&idx| self.properties[idx].is_calculated())
            .collect();

        Ok(PropertyValueCollection {
            scope: self.scope,
            properties: self.properties,
            index,
            dependents,
            calculation_order,
        })
    }
}

/// Kahn's algorithm; ties are broken by declaration order
fn topological_order(
    properties: &[PropertyValue],
    index: &HashMap<PropertyName, usize>,
) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; properties.len()];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); properties.len()];
    for (idx, property) in properties.iter().enumerate() {
        for dependency in property.dependencies() {
            if let Some(&from) = index.get(dependency) {
                edges[from].push(idx);
                in_degree[idx] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..properties.len())
        .filter(|&idx| in_degree[idx] == 0)
        .collect();
    let mut order = Vec::with_capacity(properties.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &to in &edges[idx] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                ready.insert(to);
            }
        }
    }

    if order.len() < properties.len() {
        let names = (0..properties.len())
            .filter(|&idx| in_degree[idx] > 0)
            .map(|idx| properties[idx].name().to_string())
            .collect();
        return Err(ModelError::DependencyCycle { names });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::Formula;
    use crate::core::value::ValueType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn stored(name: &str) -> PropertyValue {
        PropertyValue::from_descriptor(&PropertyDescriptor::value(name, ValueType::Integer).build())
            .unwrap()
    }

    fn calculated(name: &str, formula: Formula) -> PropertyValue {
        PropertyValue::from_descriptor(
            &PropertyDescriptor::value(name, ValueType::Integer)
                .formula(formula)
                .build(),
        )
        .unwrap()
    }

    fn names(changes: &[PropertyChange]) -> Vec<&str> {
        changes.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_set_without_dependents_reports_one_change() {
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .build()
            .unwrap();

        let changes = collection.set_value("A", Value::Integer(5)).unwrap();
        assert_eq!(names(&changes), vec!["A"]);
        assert_eq!(collection.value_of("A"), Value::Integer(5));
    }

    #[test]
    fn test_same_value_is_a_no_op() {
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .add_property(calculated("B", Formula::sum(["A"])))
            .build()
            .unwrap();

        collection.set_value("A", Value::Integer(5)).unwrap();
        let changes = collection.set_value("A", Value::Integer(5)).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_propagation_is_breadth_first() {
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("P"))
            .add_property(calculated("C1", Formula::sum(["P"])))
            .add_property(calculated(
                "D1",
                Formula::custom(["C1"], |scope| match scope.value_of("C1") {
                    Value::Integer(i) => Value::Integer(i * 10),
                    _ => Value::Null,
                }),
            ))
            .add_property(calculated("C2", Formula::sum(["P"])))
            .build()
            .unwrap();

        let changes = collection.set_value("P", Value::Integer(1)).unwrap();
        assert_eq!(names(&changes), vec!["P", "C1", "C2", "D1"]);
        assert_eq!(changes[3].old_value, Value::Null);
        assert_eq!(changes[3].value, Value::Integer(10));
    }

    #[test]
    fn test_dependents_in_declaration_order() {
        let collection = PropertyValueCollection::builder("root")
            .add_property(stored("P"))
            .add_property(calculated("Z", Formula::sum(["P"])))
            .add_property(calculated("A", Formula::sum(["P"])))
            .build()
            .unwrap();

        let dependents: Vec<&str> = collection
            .get_property_names_which_depend_on("P")
            .iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(dependents, vec!["Z", "A"]);
        assert!(collection.get_property_names_which_depend_on("Z").is_empty());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = PropertyValueCollection::builder("root")
            .add_property(calculated("A", Formula::sum(["B"])))
            .add_property(calculated("B", Formula::sum(["A"])))
            .build()
            .unwrap_err();
        match err {
            ModelError::DependencyCycle { names } => assert_eq!(names, vec!["A", "B"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let err = PropertyValueCollection::builder("root")
            .add_property(calculated("A", Formula::sum(["Missing"])))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownDependency { .. }));
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let err = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .add_property(stored("A"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_load_recalculates_each_calculated_property_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .add_property(stored("B"))
            .add_property(calculated(
                "Total",
                Formula::custom(["A", "B"], move |scope| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Formula::sum(["A", "B"]).evaluate(scope)
                }),
            ))
            .build()
            .unwrap();

        let mut values = PropertyValues::new();
        values.insert("A".into(), Value::Integer(2));
        values.insert("B".into(), Value::Integer(3));
        collection.set_values_from_map(&values).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(collection.value_of("A"), Value::Integer(2));
        assert_eq!(collection.value_of("B"), Value::Integer(3));
        assert_eq!(collection.value_of("Total"), Value::Integer(5));
        assert!(!collection.has_changes());
    }

    #[test]
    fn test_load_orders_calculations_by_dependency() {
        // Declared before its input; must still see the computed input
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(calculated("Double", Formula::sum(["Total", "Total"])))
            .add_property(stored("A"))
            .add_property(calculated("Total", Formula::sum(["A"])))
            .build()
            .unwrap();

        let mut values = PropertyValues::new();
        values.insert("A".into(), Value::Integer(4));
        collection.set_values_from_map(&values).unwrap();
        assert_eq!(collection.value_of("Double"), Value::Integer(8));
    }

    #[test]
    fn test_has_changes_tracks_baseline() {
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .build()
            .unwrap();
        collection.set_values_from_map(&PropertyValues::new()).unwrap();
        assert!(!collection.has_changes());

        collection.set_value("A", Value::Integer(1)).unwrap();
        assert!(collection.has_changes());

        collection.set_value("A", Value::Null).unwrap();
        assert!(!collection.has_changes());
    }

    #[test]
    fn test_calculated_cannot_be_set() {
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .add_property(calculated("B", Formula::sum(["A"])))
            .build()
            .unwrap();
        assert!(matches!(
            collection.set_value("B", Value::Integer(1)),
            Err(ModelError::IllegalState(_))
        ));
        assert!(matches!(
            collection.set_value("Nope", Value::Integer(1)),
            Err(ModelError::PropertyNotFound { .. })
        ));
    }

    #[test]
    fn test_values_as_map_for_selection() {
        let mut collection = PropertyValueCollection::builder("root")
            .add_property(stored("A"))
            .add_property(stored("B"))
            .build()
            .unwrap();
        collection.set_value("B", Value::Integer(9)).unwrap();

        let selected = [PropertyName::from("B"), PropertyName::from("Unknown")];
        let values = collection.get_values_as_map_for(selected.iter());
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("B"), Some(&Value::Integer(9)));
    }
}
