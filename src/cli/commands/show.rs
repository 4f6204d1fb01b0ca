//! `gwm show` command - Show one record

use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{display_value, open_window, resolve_format};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::property::{GridPropertyValue, PropertyValue};
use crate::core::value::PropertyValues;
use crate::core::window::{
    OnChangesFound, WindowModel, RECORD_ADDITIONAL_SUMMARY, RECORD_SUMMARY, WINDOW_TITLE,
};

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Position of the record in the list (see `gwm list`)
    #[arg(long, short = 'i', default_value_t = 0)]
    pub index: usize,
}

pub fn run(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let mut window = open_window(global)?;
    window
        .model
        .go_to_record(args.index, OnChangesFound::Discard)
        .into_diagnostic()?;

    let format = resolve_format(global, &window.config, OutputFormat::Auto);
    print_record(&window.model, format)
}

/// Print the current record of `model` in `format`
pub fn print_record(model: &WindowModel, format: OutputFormat) -> Result<()> {
    let values = model.property_values().into_diagnostic()?;
    match format {
        OutputFormat::Json => {
            let map = record_map(model)?;
            println!("{}", serde_json::to_string_pretty(&map).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            let map = record_map(model)?;
            print!("{}", serde_yml::to_string(&map).into_diagnostic()?);
        }
        OutputFormat::Id => {
            let key = model.descriptor().and_then(|d| d.key_property());
            if let Some(key) = key {
                println!("{}", model.get_property_or_null(key.name().as_str()));
            }
        }
        _ => {
            println!("{}", style("─".repeat(60)).dim());
            println!(
                "{} {}",
                style(display_value(&model.get_property_or_null(WINDOW_TITLE))).bold(),
                style(format!("[{}]", model.record_index())).dim()
            );
            for summary in [RECORD_SUMMARY, RECORD_ADDITIONAL_SUMMARY] {
                let value = model.get_property_or_null(summary);
                if !value.is_null() {
                    println!("{}", style(value).yellow());
                }
            }
            println!("{}", style("─".repeat(60)).dim());

            for property in values.property_values() {
                if is_builtin(property) {
                    continue;
                }
                match property {
                    PropertyValue::Grid(grid) => print_grid(grid),
                    other => {
                        let marker = if other.is_calculated() {
                            style(" (calculated)").dim().to_string()
                        } else {
                            String::new()
                        };
                        println!(
                            "{}: {}{}",
                            style(other.name()).bold(),
                            display_value(&other.value()),
                            marker
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn is_builtin(property: &PropertyValue) -> bool {
    [WINDOW_TITLE, RECORD_SUMMARY, RECORD_ADDITIONAL_SUMMARY].contains(&property.name().as_str())
}

fn print_grid(grid: &GridPropertyValue) {
    println!();
    println!("{} ({}):", style(grid.name()).bold(), grid.len());
    if grid.is_empty() {
        return;
    }

    let columns: Vec<String> = grid
        .descriptor()
        .scope_properties()
        .iter()
        .filter(|p| !p.is_grid())
        .map(|p| p.name().to_string())
        .collect();

    let mut builder = Builder::default();
    let mut header = vec!["#".to_string()];
    header.extend(columns.iter().cloned());
    builder.push_record(header);
    for (position, row) in grid.rows().iter().enumerate() {
        let mut record = vec![position.to_string()];
        for column in &columns {
            let value = row
                .properties()
                .get_property_value_or_null(column)
                .map(PropertyValue::value)
                .unwrap_or_default();
            record.push(display_value(&value));
        }
        builder.push_record(record);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

/// The record without built-ins, grids as lists of rows
fn record_map(model: &WindowModel) -> Result<PropertyValues> {
    let values = model.property_values().into_diagnostic()?;
    Ok(values
        .property_values()
        .iter()
        .filter(|p| !is_builtin(p))
        .map(|p| (p.name().clone(), p.value()))
        .collect())
}
