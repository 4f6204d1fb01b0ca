//! Record storage behind a window model
//!
//! A [`ModelDataSource`] serves the ordered record list a window navigates,
//! the nested rows of its grids and persistence of edited records. Two
//! implementations ship: [`sql::SqlModelDataSource`] over SQLite and
//! [`memory::MemoryDataSource`].

pub mod memory;
pub mod sql;

use std::fmt;
use std::sync::Arc;

use crate::core::descriptor::PropertyDescriptor;
use crate::core::error::Result;
use crate::core::value::{PropertyValues, RowSet, Value};

pub use memory::MemoryDataSource;
pub use sql::{create_tables, SqlDataSourceFactory, SqlModelDataSource};

/// Filter applied when retrieving records
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModelDataSourceQuery {
    #[default]
    All,
    /// The single record with this key
    RecordId(Value),
    /// Child rows whose parent link column holds this key
    ParentLinkId(Value),
}

impl fmt::Display for ModelDataSourceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelDataSourceQuery::All => write!(f, "all records"),
            ModelDataSourceQuery::RecordId(id) => write!(f, "record id {}", id),
            ModelDataSourceQuery::ParentLinkId(id) => write!(f, "parent link id {}", id),
        }
    }
}

/// Outcome of persisting a record
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    /// Position of the saved record in the record list
    pub record_index: usize,
    /// Key assigned to or kept by the record
    pub record_id: Value,
}

/// Storage contract of a window model
pub trait ModelDataSource: Send {
    /// Number of records in the base list, loading it on first use
    fn records_count(&self) -> Result<usize>;

    /// A copy of the record at `index`
    fn record(&self, index: usize) -> Result<PropertyValues>;

    /// Rows matching `query`, retrieved the first time they are observed
    fn retrieve_supplier(&self, query: ModelDataSourceQuery) -> RowSet;

    /// Persist `values`
    ///
    /// `Some(index)` replaces that entry of the record list with the reloaded
    /// record, `None` appends it.
    fn save_record(&mut self, index: Option<usize>, values: &PropertyValues) -> Result<SaveResult>;

    fn retrieve_record_by_id(&self, id: &Value) -> Result<Option<PropertyValues>>;
}

/// Creates the data source for a descriptor when a model first needs one
pub trait ModelDataSourceFactory: Send + Sync {
    fn create(&self, descriptor: &Arc<PropertyDescriptor>) -> Result<Box<dyn ModelDataSource>>;
}

impl<F> ModelDataSourceFactory for F
where
    F: Fn(&Arc<PropertyDescriptor>) -> Result<Box<dyn ModelDataSource>> + Send + Sync,
{
    fn create(&self, descriptor: &Arc<PropertyDescriptor>) -> Result<Box<dyn ModelDataSource>> {
        self(descriptor)
    }
}
