//! `gwm edit` command - Edit a record through the model

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use std::sync::mpsc::Receiver;

use crate::cli::commands::show::print_record;
use crate::cli::helpers::{
    describe_event, open_window, parse_assignment, parse_grid_assignment, parse_grid_row,
    resolve_format,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::events::ModelEvent;
use crate::core::property::GridRowId;
use crate::core::value::Value;
use crate::core::window::{OnChangesFound, WindowModel};

/// Edits shared by `gwm edit` and `gwm new`
///
/// Rows are added first, then values are set, then rows are removed, so row
/// positions refer to the grid after `--add-row`.
#[derive(clap::Args, Debug, Default)]
pub struct EditOptions {
    /// Set a property (NAME=VALUE, empty VALUE clears it)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub sets: Vec<String>,

    /// Set a grid property (GRID:ROW:NAME=VALUE, ROW is the row position)
    #[arg(long = "grid-set", value_name = "GRID:ROW:NAME=VALUE")]
    pub grid_sets: Vec<String>,

    /// Append a row to a grid
    #[arg(long = "add-row", value_name = "GRID")]
    pub add_rows: Vec<String>,

    /// Remove a grid row (GRID:ROW)
    #[arg(long = "remove-row", value_name = "GRID:ROW")]
    pub remove_rows: Vec<String>,
}

impl EditOptions {
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
            && self.grid_sets.is_empty()
            && self.add_rows.is_empty()
            && self.remove_rows.is_empty()
    }
}

#[derive(clap::Args, Debug)]
pub struct EditArgs {
    /// Position of the record in the list (see `gwm list`)
    #[arg(long, short = 'i', default_value_t = 0)]
    pub index: usize,

    #[command(flatten)]
    pub edits: EditOptions,

    /// Apply the edits and print the changes without saving
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: EditArgs, global: &GlobalOpts) -> Result<()> {
    if args.edits.is_empty() {
        return Err(miette!(
            "Nothing to edit. Use --set, --grid-set, --add-row or --remove-row"
        ));
    }

    let mut window = open_window(global)?;
    window
        .model
        .go_to_record(args.index, OnChangesFound::Discard)
        .into_diagnostic()?;

    let (_, events) = window.model.subscribe_channel();
    apply_edits(&mut window.model, &args.edits)?;
    if !global.quiet {
        print_events(&events);
    }

    if args.dry_run {
        if !global.quiet {
            println!("{} Dry run, nothing saved", style("→").dim());
        }
        return Ok(());
    }

    save_and_print(&mut window.model, global, &window.config)
}

/// Apply every edit to the current record
pub fn apply_edits(model: &mut WindowModel, edits: &EditOptions) -> Result<()> {
    for grid in &edits.add_rows {
        model.grid_new_row(grid).into_diagnostic()?;
    }

    for arg in &edits.sets {
        let (name, raw) = parse_assignment(arg)?;
        if model.is_read_only_for_user(&name).into_diagnostic()? {
            eprintln!(
                "{} {} is read-only, ignored",
                style("!").yellow(),
                style(&name).bold()
            );
            continue;
        }
        model.set_property(&name, cli_value(raw)).into_diagnostic()?;
    }

    for arg in &edits.grid_sets {
        let assignment = parse_grid_assignment(arg)?;
        let row_id = row_at(model, &assignment.grid, assignment.row)?;
        model
            .set_grid_property(
                &assignment.grid,
                row_id,
                &assignment.name,
                cli_value(assignment.value),
            )
            .into_diagnostic()?;
    }

    // Highest position first so earlier removals don't shift later ones
    let mut removals = edits
        .remove_rows
        .iter()
        .map(|arg| parse_grid_row(arg))
        .collect::<Result<Vec<_>>>()?;
    removals.sort_by(|a, b| b.1.cmp(&a.1));
    for (grid, row) in removals {
        let row_id = row_at(model, &grid, row)?;
        model.grid_remove_row(&grid, row_id).into_diagnostic()?;
    }
    Ok(())
}

/// Save the current record and print it
pub fn save_and_print(model: &mut WindowModel, global: &GlobalOpts, config: &Config) -> Result<()> {
    if !model.has_changes() && !model.is_new_record() {
        if !global.quiet {
            println!("No changes to save.");
        }
        return Ok(());
    }

    let saved = model.save_record().into_diagnostic()?;
    if !global.quiet {
        println!(
            "{} Saved record {} at index {}",
            style("✓").green(),
            style(&saved.record_id).cyan(),
            saved.record_index
        );
    }

    match resolve_format(global, config, OutputFormat::Auto) {
        OutputFormat::Auto if global.quiet => Ok(()),
        format => print_record(model, format),
    }
}

fn row_at(model: &WindowModel, grid: &str, position: usize) -> Result<GridRowId> {
    let rows = model.grid_row_ids(grid).into_diagnostic()?;
    rows.get(position).copied().ok_or_else(|| {
        miette!(
            "Grid {} has {} row(s), there is no row {}",
            grid,
            rows.len(),
            position
        )
    })
}

fn cli_value(raw: String) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        Value::Text(raw)
    }
}

fn print_events(events: &Receiver<ModelEvent>) {
    for event in events.try_iter() {
        println!("{}", describe_event(&event));
    }
}
