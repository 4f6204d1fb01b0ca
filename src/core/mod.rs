//! Core module - the window model and its storage

pub mod cipher;
pub mod collection;
pub mod config;
pub mod datasource;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod formula;
pub mod property;
pub mod schema;
pub mod value;
pub mod window;

pub use cipher::{FieldCipher, PlainText};
pub use collection::{PropertyChange, PropertyValueCollection};
pub use config::Config;
pub use datasource::{
    MemoryDataSource, ModelDataSource, ModelDataSourceFactory, ModelDataSourceQuery, SaveResult,
    SqlDataSourceFactory, SqlModelDataSource,
};
pub use descriptor::{ColumnBinding, LookupSource, PropertyDescriptor, PropertyKind};
pub use error::{ModelError, Result};
pub use events::{ListenerId, ModelEvent, ModelEventDispatcher};
pub use formula::{Formula, TextTemplate, ValueLookup};
pub use property::{GridPropertyValue, GridRowId, PropertyValue};
pub use schema::WindowSchema;
pub use value::{LookupKey, LookupValue, PropertyName, PropertyValues, RowSet, Value, ValueType};
pub use window::{Navigation, OnChangesFound, RecordIndex, WindowModel, WindowSummaries};
