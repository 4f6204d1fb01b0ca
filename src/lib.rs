//! GWM: Generic Window Model
//!
//! A record editing model driven by a property descriptor tree. Calculated
//! properties follow their dependencies, grids hold nested rows, and records
//! are loaded from and saved to tables through generated SQL.

pub mod cli;
pub mod core;

pub use crate::core::{ModelError, PropertyDescriptor, Value, WindowModel};
