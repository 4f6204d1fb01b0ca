//! `gwm new` command - Create a record

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::edit::{apply_edits, save_and_print, EditOptions};
use crate::cli::helpers::{describe_event, open_window, parse_record_id};
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Pre-fill the record from the record with this id
    #[arg(long, value_name = "ID")]
    pub copy_from: Option<String>,

    #[command(flatten)]
    pub edits: EditOptions,

    /// Apply the edits and print the changes without saving
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut window = open_window(global)?;
    let (_, events) = window.model.subscribe_channel();

    match &args.copy_from {
        Some(id) => window
            .model
            .new_record_as_copy_by_id(&parse_record_id(id))
            .into_diagnostic()?,
        None => window.model.new_record().into_diagnostic()?,
    }
    // Only the explicit edits are reported
    events.try_iter().count();

    apply_edits(&mut window.model, &args.edits)?;
    if !global.quiet {
        for event in events.try_iter() {
            println!("{}", describe_event(&event));
        }
    }

    if args.dry_run {
        if !global.quiet {
            println!("{} Dry run, nothing saved", style("→").dim());
        }
        return Ok(());
    }

    save_and_print(&mut window.model, global, &window.config)
}
