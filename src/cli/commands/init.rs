//! `gwm init` command - Create the tables of a window

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use std::path::Path;

use crate::cli::helpers::{database_path, load_schema, schema_path};
use crate::cli::GlobalOpts;
use crate::core::config::{Config, PROJECT_DIR};
use crate::core::datasource::{create_tables, SqlDataSourceFactory};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Also write .gwm/config.yaml in the current directory so later
    /// commands find the schema and database without flags
    #[arg(long)]
    pub save_config: bool,

    /// Overwrite an existing .gwm/config.yaml
    #[arg(long, requires = "save_config")]
    pub force: bool,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let (schema, descriptor) = load_schema(global, &config)?;
    let database = database_path(global, &config)?;

    if let Some(parent) = database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }
    let factory = SqlDataSourceFactory::open(&database).into_diagnostic()?;
    {
        let conn = factory
            .connection()
            .lock()
            .map_err(|_| miette!("Database connection lock is poisoned"))?;
        create_tables(&conn, &descriptor).into_diagnostic()?;
    }

    if !global.quiet {
        println!(
            "{} Created tables for window {} in {}",
            style("✓").green(),
            style(&schema.name).cyan(),
            style(database.display()).cyan()
        );
    }

    if args.save_config {
        let cwd = std::env::current_dir().into_diagnostic()?;
        let schema = schema_path(global, &config)?;
        write_project_config(&cwd, &schema, &database, args.force)?;
        if !global.quiet {
            println!(
                "{} Wrote {}",
                style("✓").green(),
                style(cwd.join(PROJECT_DIR).join("config.yaml").display()).cyan()
            );
        }
    }

    if !global.quiet {
        println!();
        println!("Next steps:");
        println!("  {} Create a record", style("gwm new --set NAME=VALUE").yellow());
        println!("  {} List records", style("gwm list").yellow());
    }
    Ok(())
}

fn write_project_config(root: &Path, schema: &Path, database: &Path, force: bool) -> Result<()> {
    let dir = root.join(PROJECT_DIR);
    let path = dir.join("config.yaml");
    if path.exists() && !force {
        return Err(miette!(
            "{} already exists. Use --force to overwrite",
            path.display()
        ));
    }
    std::fs::create_dir_all(&dir).into_diagnostic()?;

    let absolute = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    };
    let config = Config {
        schema: Some(absolute(schema)),
        database: Some(absolute(database)),
        ..Default::default()
    };
    let yaml = serde_yml::to_string(&config).into_diagnostic()?;
    std::fs::write(&path, yaml).into_diagnostic()?;
    Ok(())
}
