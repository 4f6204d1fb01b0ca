//! `gwm list` command - List the records of a window

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{display_value, open_window, resolve_format, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::value::Value;
use crate::core::window::{OnChangesFound, WindowModel, RECORD_ADDITIONAL_SUMMARY, RECORD_SUMMARY, WINDOW_TITLE};

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show only the first N records
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Print only the number of records
    #[arg(long)]
    pub count: bool,
}

#[derive(Debug, Serialize)]
struct RecordRow {
    index: usize,
    id: Value,
    title: Value,
    summary: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    additional_summary: Value,
}

pub fn run(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let mut window = open_window(global)?;
    let total = window.model.records_count().into_diagnostic()?;

    if args.count {
        println!("{}", total);
        return Ok(());
    }

    if total == 0 {
        if !global.quiet {
            println!("No records found.");
        }
        return Ok(());
    }

    let shown = args.limit.map_or(total, |limit| limit.min(total));
    let rows = collect_rows(&mut window.model, shown)?;

    match resolve_format(global, &window.config, OutputFormat::Tsv) {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&rows).into_diagnostic()?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yml::to_string(&rows).into_diagnostic()?;
            print!("{}", yaml);
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer
                .write_record(["index", "id", "title", "summary", "additional_summary"])
                .into_diagnostic()?;
            for row in &rows {
                writer
                    .write_record([
                        row.index.to_string(),
                        row.id.to_string(),
                        row.title.to_string(),
                        row.summary.to_string(),
                        row.additional_summary.to_string(),
                    ])
                    .into_diagnostic()?;
            }
            writer.flush().into_diagnostic()?;
        }
        OutputFormat::Md => {
            let mut builder = Builder::default();
            builder.push_record(["#", "ID", "Title", "Summary"]);
            for row in &rows {
                builder.push_record([
                    row.index.to_string(),
                    display_value(&row.id),
                    display_value(&row.title),
                    display_value(&row.summary),
                ]);
            }
            println!("{}", builder.build().with(Style::markdown()));
        }
        OutputFormat::Id => {
            for row in &rows {
                println!("{}", row.id);
            }
        }
        OutputFormat::Tsv | OutputFormat::Auto => {
            println!(
                "{:<6} {:<10} {:<30} {}",
                style("#").bold().dim(),
                style("ID").bold(),
                style("TITLE").bold(),
                style("SUMMARY").bold()
            );
            println!("{}", "-".repeat(80));
            for row in &rows {
                println!(
                    "{:<6} {:<10} {:<30} {}",
                    style(row.index).cyan(),
                    display_value(&row.id),
                    truncate_str(&display_value(&row.title), 28),
                    display_value(&row.summary)
                );
            }
            if !global.quiet {
                println!();
                println!(
                    "{} of {} record(s) of {}.",
                    style(rows.len()).cyan(),
                    total,
                    style(&window.schema.name).cyan()
                );
            }
        }
    }

    Ok(())
}

fn collect_rows(model: &mut WindowModel, count: usize) -> Result<Vec<RecordRow>> {
    let key = model
        .descriptor()
        .and_then(|d| d.key_property())
        .map(|p| p.name().clone());

    let mut rows = Vec::with_capacity(count);
    for index in 0..count {
        model
            .go_to_record(index, OnChangesFound::Discard)
            .into_diagnostic()?;
        rows.push(RecordRow {
            index,
            id: key
                .as_ref()
                .map(|k| model.get_property_or_null(k.as_str()))
                .unwrap_or_default(),
            title: model.get_property_or_null(WINDOW_TITLE),
            summary: model.get_property_or_null(RECORD_SUMMARY),
            additional_summary: model.get_property_or_null(RECORD_ADDITIONAL_SUMMARY),
        });
    }
    Ok(rows)
}
