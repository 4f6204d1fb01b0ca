use clap::Parser;
use gwm::cli::{Cli, Commands, GlobalOpts};
use gwm::core::config::Config;
use miette::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    // Install miette's fancy error handler
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(&global);

    match cli.command {
        Commands::Init(args) => gwm::cli::commands::init::run(args, &global),
        Commands::Sql(args) => gwm::cli::commands::sql::run(args, &global),
        Commands::List(args) => gwm::cli::commands::list::run(args, &global),
        Commands::Show(args) => gwm::cli::commands::show::run(args, &global),
        Commands::Edit(args) => gwm::cli::commands::edit::run(args, &global),
        Commands::New(args) => gwm::cli::commands::new::run(args, &global),
    }
}

/// `--verbose` wins, then `RUST_LOG`, then the configured level
fn init_logging(global: &GlobalOpts) {
    let filter = if global.verbose {
        EnvFilter::new("gwm=debug")
    } else if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else {
        let level = Config::load().log.unwrap_or_else(|| "warn".to_string());
        EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
