//! Window schema files
//!
//! A window is described in YAML and turned into a validated descriptor
//! tree:
//!
//! ```yaml
//! name: Order
//! caption: Sales Order
//! table: c_order
//! title: "Order {{ DocumentNo }}"
//! properties:
//!   - name: OrderId
//!     type: identifier
//!     column: c_order_id
//!     key: true
//!   - name: Total
//!     type: decimal
//!     formula: { product: [Qty, Price] }
//!   - name: Lines
//!     grid:
//!       table: c_orderline
//!       properties: [...]
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::core::collection::PropertyValueCollection;
use crate::core::datasource::sql::SqlTable;
use crate::core::descriptor::{ColumnBinding, PropertyDescriptor};
use crate::core::error::{ModelError, Result};
use crate::core::formula::Formula;
use crate::core::value::{PropertyName, Value, ValueType};
use crate::core::window::WindowSummaries;

/// Top level of a window schema file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSchema {
    pub name: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub table: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub additional_summary: Option<String>,
    pub properties: Vec<PropertySchema>,
}

/// One entry of a `properties` list
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySchema {
    pub name: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, rename = "type")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub parent_link: bool,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub lookup: Option<LookupSchema>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub formula: Option<FormulaSchema>,
    #[serde(default)]
    pub default: Option<serde_yml::Value>,
    #[serde(default)]
    pub group: Option<Vec<PropertySchema>>,
    #[serde(default)]
    pub grid: Option<GridSchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSchema {
    pub table: String,
    pub properties: Vec<PropertySchema>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupSchema {
    pub table: String,
    pub key: String,
    pub display: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaSchema {
    Sum(Vec<String>),
    Product(Vec<String>),
    Template(String),
}

impl FormulaSchema {
    fn to_formula(&self) -> Result<Formula> {
        Ok(match self {
            FormulaSchema::Sum(inputs) => Formula::sum(inputs.iter().map(String::as_str)),
            FormulaSchema::Product(inputs) => Formula::product(inputs.iter().map(String::as_str)),
            FormulaSchema::Template(template) => Formula::template(template)?,
        })
    }
}

impl WindowSchema {
    /// Read and parse a schema file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        serde_yml::from_str(contents).map_err(|e| ModelError::Yaml {
            message: e.to_string(),
        })
    }

    pub fn summaries(&self) -> WindowSummaries {
        WindowSummaries {
            title: self.title.clone(),
            summary: self.summary.clone(),
            additional_summary: self.additional_summary.clone(),
        }
    }

    /// Build the descriptor tree and check it can be loaded and stored
    pub fn into_descriptor(&self) -> Result<Arc<PropertyDescriptor>> {
        let mut root = PropertyDescriptor::group(self.name.as_str()).table(self.table.as_str());
        if let Some(caption) = &self.caption {
            root = root.caption(caption.as_str());
        }
        for property in &self.properties {
            root = root.child(property.to_descriptor()?);
        }
        let root = root.build();

        // Grid row scopes are checked while their values are built
        PropertyValueCollection::builder(root.name().clone())
            .add_scope(&root)?
            .build()?;
        SqlTable::from_root(&root)?;
        Ok(root)
    }
}

impl PropertySchema {
    fn to_descriptor(&self) -> Result<Arc<PropertyDescriptor>> {
        let name = PropertyName::from(self.name.as_str());
        if self.name.trim().is_empty() {
            return Err(ModelError::InvalidSchema("property without a name".to_string()));
        }

        let kinds = [
            self.value_type.is_some(),
            self.group.is_some(),
            self.grid.is_some(),
        ];
        if kinds.iter().filter(|set| **set).count() != 1 {
            return Err(ModelError::InvalidSchema(format!(
                "{} needs exactly one of type, group or grid",
                self.name
            )));
        }

        let mut builder = if let Some(children) = &self.group {
            let mut group = PropertyDescriptor::group(name.clone());
            for child in children {
                group = group.child(child.to_descriptor()?);
            }
            group
        } else if let Some(grid) = &self.grid {
            let mut builder = PropertyDescriptor::grid(name.clone(), grid.table.as_str());
            for child in &grid.properties {
                builder = builder.child(child.to_descriptor()?);
            }
            builder
        } else {
            let value_type = self.value_type.ok_or_else(|| {
                ModelError::InvalidSchema(format!("{} has no type", self.name))
            })?;
            let mut builder = PropertyDescriptor::value(name.clone(), value_type)
                .read_only(self.read_only);
            if let Some(column) = self.column_binding()? {
                builder = builder.column(column);
            }
            if let Some(formula) = &self.formula {
                builder = builder.formula(formula.to_formula()?);
            }
            if let Some(default) = &self.default {
                let value = value_type.normalize(&name, yaml_to_value(&name, default)?)?;
                builder = builder.default_value(value);
            }
            builder
        };

        if self.value_type.is_none()
            && (self.column.is_some() || self.formula.is_some() || self.default.is_some())
        {
            return Err(ModelError::InvalidSchema(format!(
                "{}: only typed properties may have a column, formula or default",
                self.name
            )));
        }

        if let Some(caption) = &self.caption {
            builder = builder.caption(caption.as_str());
        }
        for dependency in &self.depends_on {
            builder = builder.depends_on(dependency.as_str());
        }
        Ok(builder.build())
    }

    fn column_binding(&self) -> Result<Option<ColumnBinding>> {
        let Some(column) = &self.column else {
            if self.key || self.parent_link || self.encrypted || self.lookup.is_some() {
                return Err(ModelError::InvalidSchema(format!(
                    "{} has column options but no column",
                    self.name
                )));
            }
            return Ok(None);
        };

        let mut binding = ColumnBinding::new(column.as_str());
        if self.key {
            binding = binding.key();
        }
        if self.parent_link {
            binding = binding.parent_link();
        }
        if self.encrypted {
            binding = binding.encrypted();
        }
        if let Some(lookup) = &self.lookup {
            binding = binding.lookup(
                lookup.table.as_str(),
                lookup.key.as_str(),
                lookup.display.as_str(),
            );
        }
        Ok(Some(binding))
    }
}

fn yaml_to_value(name: &PropertyName, yaml: &serde_yml::Value) -> Result<Value> {
    Ok(match yaml {
        serde_yml::Value::Null => Value::Null,
        serde_yml::Value::Bool(b) => Value::Boolean(*b),
        serde_yml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::decimal(&n.to_string())?,
        },
        serde_yml::Value::String(s) => Value::text(s.as_str()),
        other => {
            return Err(ModelError::invalid_value(
                name,
                format!("unsupported default {:?}", other),
            ))
        }
    })
}
