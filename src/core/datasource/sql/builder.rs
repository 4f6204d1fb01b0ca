//! Builds the table mapping and SQL text for a descriptor tree

use std::sync::Arc;

use indexmap::IndexMap;

use super::field::{sql_type_of, SqlField};
use crate::core::descriptor::{LookupSource, PropertyDescriptor};
use crate::core::error::{ModelError, Result};
use crate::core::value::{PropertyName, ValueType};

/// Alias of the main table in generated statements
pub const TABLE_ALIAS: &str = "t";

/// A table and everything needed to read and write one of its rows
#[derive(Debug)]
pub struct SqlTable {
    pub name: String,
    pub fields: Vec<SqlField>,
    key: usize,
    parent_link: Option<usize>,
    select: String,
    /// Grid properties of this scope and the tables behind them
    pub children: Vec<(PropertyName, Arc<SqlTable>)>,
}

impl SqlTable {
    /// Map the root descriptor of a window
    pub fn from_root(descriptor: &PropertyDescriptor) -> Result<Arc<Self>> {
        Self::build(descriptor, false)
    }

    pub fn key(&self) -> &SqlField {
        &self.fields[self.key]
    }

    pub fn parent_link(&self) -> Option<&SqlField> {
        self.parent_link.map(|idx| &self.fields[idx])
    }

    /// `SELECT ... FROM table t` without filter or ordering
    pub fn select(&self) -> &str {
        &self.select
    }

    /// Total result columns of the select list
    pub fn width(&self) -> usize {
        self.fields.iter().map(SqlField::width).sum()
    }

    /// This table followed by all nested grid tables, depth first
    pub fn tables(self: &Arc<Self>) -> Vec<Arc<SqlTable>> {
        let mut tables = vec![Arc::clone(self)];
        for (_, child) in &self.children {
            tables.extend(child.tables());
        }
        tables
    }

    /// `CREATE TABLE IF NOT EXISTS` statements for this table, its grids and
    /// every lookup table they reference
    pub fn create_statements(self: &Arc<Self>) -> Vec<String> {
        let tables = self.tables();
        let mut lookups: IndexMap<String, (LookupSource, ValueType)> = IndexMap::new();
        let mut statements = Vec::new();

        for table in &tables {
            let columns: Vec<String> = table
                .fields
                .iter()
                .map(|field| {
                    if let Some(lookup) = &field.lookup {
                        lookups
                            .entry(lookup.table.clone())
                            .or_insert_with(|| (lookup.clone(), field.value_type));
                    }
                    if field.key {
                        if field.sql_type() == "INTEGER" {
                            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", field.column)
                        } else {
                            format!("{} {} PRIMARY KEY", field.column, field.sql_type())
                        }
                    } else {
                        format!("{} {}", field.column, field.sql_type())
                    }
                })
                .collect();
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
                table.name,
                columns.join(",\n    ")
            ));
            if let Some(parent_link) = table.parent_link() {
                statements.push(format!(
                    "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                    table = table.name,
                    column = parent_link.column
                ));
            }
        }

        for (table, (lookup, value_type)) in lookups {
            if tables.iter().any(|t| t.name == table) {
                continue;
            }
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    {} {} PRIMARY KEY,\n    {} TEXT\n)",
                table,
                lookup.key_column,
                sql_type_of(value_type),
                lookup.display_column
            ));
        }

        statements
    }

    fn build(descriptor: &PropertyDescriptor, is_grid: bool) -> Result<Arc<Self>> {
        let name = descriptor.table().ok_or_else(|| {
            ModelError::InvalidSchema(format!("{} has no table", descriptor.name()))
        })?;
        validate_identifier(name)?;

        let mut fields = Vec::new();
        let mut children = Vec::new();
        for property in descriptor.scope_properties() {
            if property.is_grid() {
                children.push((property.name().clone(), Self::build(property, true)?));
                continue;
            }
            let (Some(binding), Some(value_type)) = (property.column(), property.value_type())
            else {
                continue;
            };
            validate_identifier(&binding.column)?;
            if let Some(lookup) = &binding.lookup {
                if !value_type.is_lookup() {
                    return Err(ModelError::InvalidSchema(format!(
                        "{} has a lookup source but is not a lookup",
                        property.name()
                    )));
                }
                validate_identifier(&lookup.table)?;
                validate_identifier(&lookup.key_column)?;
                validate_identifier(&lookup.display_column)?;
            }
            if fields.iter().any(|f: &SqlField| f.column == binding.column) {
                return Err(ModelError::InvalidSchema(format!(
                    "column {} is mapped twice in {}",
                    binding.column, name
                )));
            }
            fields.push(SqlField {
                property: property.name().clone(),
                column: binding.column.clone(),
                value_type,
                key: binding.key,
                parent_link: binding.parent_link,
                encrypted: binding.encrypted,
                lookup: binding.lookup.clone(),
            });
        }

        let key = single_position(&fields, name, "key", |f| f.key)?.ok_or_else(|| {
            ModelError::InvalidSchema(format!("table {} has no key column", name))
        })?;
        let parent_link = single_position(&fields, name, "parent link", |f| f.parent_link)?;
        if is_grid && parent_link.is_none() {
            return Err(ModelError::InvalidSchema(format!(
                "grid table {} has no parent link column",
                name
            )));
        }

        let select_list: Vec<String> = fields
            .iter()
            .flat_map(|f| f.select_expressions(TABLE_ALIAS))
            .collect();
        let select = format!(
            "SELECT {} FROM {} {}",
            select_list.join(", "),
            name,
            TABLE_ALIAS
        );

        Ok(Arc::new(SqlTable {
            name: name.to_string(),
            fields,
            key,
            parent_link,
            select,
            children,
        }))
    }
}

fn single_position(
    fields: &[SqlField],
    table: &str,
    what: &str,
    predicate: impl Fn(&SqlField) -> bool,
) -> Result<Option<usize>> {
    let mut positions = fields.iter().enumerate().filter(|(_, f)| predicate(f));
    let first = positions.next().map(|(idx, _)| idx);
    if positions.next().is_some() {
        return Err(ModelError::InvalidSchema(format!(
            "table {} has more than one {} column",
            table, what
        )));
    }
    Ok(first)
}

/// Accept only plain SQL identifiers: a letter or underscore followed by
/// letters, digits or underscores
pub fn validate_identifier(identifier: &str) -> Result<()> {
    let mut chars = identifier.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidSchema(format!(
            "'{}' is not a valid SQL identifier",
            identifier
        )))
    }
}
