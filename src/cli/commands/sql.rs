//! `gwm sql` command - Print generated statements

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::load_schema;
use crate::cli::GlobalOpts;
use crate::core::config::Config;
use crate::core::datasource::sql::SqlTable;

#[derive(clap::Args, Debug)]
pub struct SqlArgs {
    /// Print CREATE TABLE statements instead of SELECTs
    #[arg(long)]
    pub ddl: bool,
}

pub fn run(args: SqlArgs, global: &GlobalOpts) -> Result<()> {
    let config = Config::load();
    let (_, descriptor) = load_schema(global, &config)?;
    let root = SqlTable::from_root(&descriptor).into_diagnostic()?;

    if args.ddl {
        for statement in root.create_statements() {
            println!("{};", statement);
        }
        return Ok(());
    }

    for table in root.tables() {
        if !global.quiet {
            println!("{} {}", style("--").dim(), style(&table.name).cyan());
        }
        println!("{};", table.select());
    }
    Ok(())
}
