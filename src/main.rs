//! Roster CLI entry point.

use clap::Parser;
use roster::cli::commands;
use roster::cli::{Cli, Commands};
use roster::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    match &cli.command {
        Commands::Version => commands::version::execute(json),
        Commands::Migrate => commands::migrate::execute(db, json),

        // People
        Commands::Add { name, age, house } => commands::person::add(name, *age, *house, db, json),
        Commands::List { house, older_than } => commands::person::list(*house, *older_than, db, json),
        Commands::Show { id } => commands::person::show(*id, db, json),
        Commands::SetAge { id, age } => commands::person::set_age(*id, *age, db, json),
        Commands::Delete { id } => commands::person::delete(*id, db, json),

        // Live view
        Commands::Watch { seconds } => commands::watch::execute(*seconds, db, json),
    }
}
