//! Shared helper functions for CLI commands
//!
//! Opening a window session from the global options and config, parsing
//! `NAME=VALUE` style arguments and formatting values for terminal output.

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::datasource::SqlDataSourceFactory;
use crate::core::descriptor::PropertyDescriptor;
use crate::core::events::ModelEvent;
use crate::core::schema::WindowSchema;
use crate::core::value::Value;
use crate::core::window::WindowModel;

/// A window model opened on the configured schema and database
pub struct OpenWindow {
    pub model: WindowModel,
    pub schema: WindowSchema,
    pub config: Config,
}

/// Schema path from the command line, else from config
pub fn schema_path(global: &GlobalOpts, config: &Config) -> Result<PathBuf> {
    global
        .schema
        .clone()
        .or_else(|| config.schema.clone())
        .ok_or_else(|| {
            miette!("No window schema given. Use --schema or set `schema` in .gwm/config.yaml")
        })
}

/// Database path from the command line, else from config
pub fn database_path(global: &GlobalOpts, config: &Config) -> Result<PathBuf> {
    global
        .database
        .clone()
        .or_else(|| config.database.clone())
        .ok_or_else(|| {
            miette!("No database given. Use --database or set `database` in .gwm/config.yaml")
        })
}

/// Load and validate the window schema
pub fn load_schema(
    global: &GlobalOpts,
    config: &Config,
) -> Result<(WindowSchema, Arc<PropertyDescriptor>)> {
    let path = schema_path(global, config)?;
    let schema = WindowSchema::load(&path)
        .map_err(|e| miette!("Failed to load schema {}: {}", path.display(), e))?;
    let descriptor = schema.into_descriptor().into_diagnostic()?;
    Ok((schema, descriptor))
}

/// Open the database for an existing window
pub fn open_database(global: &GlobalOpts, config: &Config) -> Result<SqlDataSourceFactory> {
    let path = database_path(global, config)?;
    if !path.exists() {
        return Err(miette!(
            "Database {} does not exist. Run `gwm init` first",
            path.display()
        ));
    }
    SqlDataSourceFactory::open(&path).into_diagnostic()
}

/// Assign the schema to a fresh model backed by the database
pub fn open_window(global: &GlobalOpts) -> Result<OpenWindow> {
    let config = Config::load();
    let (schema, descriptor) = load_schema(global, &config)?;
    let factory = open_database(global, &config)?;

    let mut model = WindowModel::new()
        .with_factory(Arc::new(factory))
        .with_summaries(schema.summaries());
    model.assign_schema(descriptor).into_diagnostic()?;

    Ok(OpenWindow {
        model,
        schema,
        config,
    })
}

/// The explicit `--format`, else the configured default, else `fallback`
pub fn resolve_format(global: &GlobalOpts, config: &Config, fallback: OutputFormat) -> OutputFormat {
    if global.format != OutputFormat::Auto {
        return global.format;
    }
    config
        .default_format
        .as_deref()
        .and_then(OutputFormat::from_config)
        .filter(|f| *f != OutputFormat::Auto)
        .unwrap_or(fallback)
}

/// A `GRID:ROW:NAME=VALUE` argument; `row` is the position in the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAssignment {
    pub grid: String,
    pub row: usize,
    pub name: String,
    pub value: String,
}

/// Split `NAME=VALUE`
pub fn parse_assignment(arg: &str) -> Result<(String, String)> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| miette!("Expected NAME=VALUE, got '{}'", arg))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(miette!("Missing property name in '{}'", arg));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Split `GRID:ROW`
pub fn parse_grid_row(arg: &str) -> Result<(String, usize)> {
    let (grid, row) = arg
        .split_once(':')
        .ok_or_else(|| miette!("Expected GRID:ROW, got '{}'", arg))?;
    let row = row
        .trim()
        .parse::<usize>()
        .map_err(|_| miette!("Row must be a number in '{}'", arg))?;
    Ok((grid.trim().to_string(), row))
}

/// Split `GRID:ROW:NAME=VALUE`
pub fn parse_grid_assignment(arg: &str) -> Result<GridAssignment> {
    let (target, value) = arg
        .split_once('=')
        .ok_or_else(|| miette!("Expected GRID:ROW:NAME=VALUE, got '{}'", arg))?;
    let (grid_row, name) = target
        .rsplit_once(':')
        .ok_or_else(|| miette!("Expected GRID:ROW:NAME=VALUE, got '{}'", arg))?;
    let (grid, row) = parse_grid_row(grid_row)?;
    Ok(GridAssignment {
        grid,
        row,
        name: name.trim().to_string(),
        value: value.to_string(),
    })
}

/// Record ids are integers when they parse as one
pub fn parse_record_id(arg: &str) -> Value {
    match arg.trim().parse::<i64>() {
        Ok(id) => Value::Integer(id),
        Err(_) => Value::text(arg.trim()),
    }
}

/// Value as shown in tables; empty values become `-`
pub fn display_value(value: &Value) -> String {
    if value.is_null() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// One line describing an event, styled for the terminal
pub fn describe_event(event: &ModelEvent) -> String {
    match event {
        ModelEvent::AllPropertiesChanged { .. } => format!("{} record loaded", style("↻").dim()),
        ModelEvent::PropertyChanged {
            name,
            value,
            old_value,
            ..
        } => format!(
            "{} {}: {} → {}",
            style("•").cyan(),
            style(name).bold(),
            display_value(old_value),
            style(display_value(value)).yellow()
        ),
        ModelEvent::GridPropertyChanged {
            grid,
            row_id,
            name,
            value,
            old_value,
            ..
        } => format!(
            "{} {}[{}].{}: {} → {}",
            style("•").cyan(),
            grid,
            style(row_id).dim(),
            style(name).bold(),
            display_value(old_value),
            style(display_value(value)).yellow()
        ),
        ModelEvent::GridRowAdded { grid, row_id, .. } => {
            format!("{} {} row {}", style("+").green(), grid, style(row_id).dim())
        }
        ModelEvent::GridRowRemoved { grid, row_id, .. } => {
            format!("{} {} row {}", style("-").red(), grid, style(row_id).dim())
        }
        ModelEvent::ConfirmDiscardChanges { .. } => {
            format!("{} unsaved changes", style("!").yellow())
        }
    }
}
