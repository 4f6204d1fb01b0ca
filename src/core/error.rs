//! Error types shared by the model, the data sources and the controller

use thiserror::Error;

use crate::core::value::PropertyName;

/// Errors that can occur while building, editing or persisting a window model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Property not found: {name}")]
    PropertyNotFound { name: PropertyName },

    #[error("Grid row {row_id} not found in grid {grid}")]
    GridRowNotFound { grid: PropertyName, row_id: String },

    #[error("Property {name} is not a grid")]
    NotAGrid { name: PropertyName },

    #[error("Invalid record index: {0}")]
    InvalidRecordIndex(usize),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Duplicate property {name} in scope {scope}")]
    DuplicateProperty {
        scope: PropertyName,
        name: PropertyName,
    },

    #[error("Property {property} depends on {dependency}, which is not declared in the same scope")]
    UnknownDependency {
        property: PropertyName,
        dependency: PropertyName,
    },

    #[error("Dependency cycle between properties: {}", names.join(" → "))]
    DependencyCycle { names: Vec<String> },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid template {template:?}: {message}")]
    Template { template: String, message: String },

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: PropertyName, message: String },

    #[error("No schema assigned to the window model")]
    SchemaNotAssigned,

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("More than one record found for {query}")]
    MultipleResultsFound { query: String },

    #[error("Query failed: {source}\nSQL: {sql}\nParameters: {params:?}")]
    Query {
        sql: String,
        params: Vec<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Database connection lock is poisoned")]
    ConnectionPoisoned,

    #[error("Cipher error on column {column}: {message}")]
    Cipher { column: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {message}")]
    Yaml { message: String },
}

impl ModelError {
    pub(crate) fn not_found(name: impl Into<PropertyName>) -> Self {
        ModelError::PropertyNotFound { name: name.into() }
    }

    /// Error for [`FieldCipher`](crate::core::cipher::FieldCipher) implementations
    pub fn cipher(column: &str, message: impl Into<String>) -> Self {
        ModelError::Cipher {
            column: column.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_value(name: &PropertyName, message: impl Into<String>) -> Self {
        ModelError::InvalidValue {
            name: name.clone(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
