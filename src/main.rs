mod repl;

use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use minidb::config::Cli;
use minidb::engine::{Engine, EngineConfig};
use minidb::errors;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match OpenOptions::new().append(true).create(true).open(&cli.log_file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open log file {}: {}", cli.log_file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig {
        max_pages: cli.max_pages,
        max_tables: cli.max_tables,
        max_indexes: cli.max_indexes,
        max_open_tables: cli.max_open_tables,
    };

    let mut engine = match Engine::open(cli.filename.clone(), config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("failed to open {}: {}", cli.filename.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = repl::start(&mut engine);

    if let Err(e) = engine.close() {
        eprintln!("failed to close database cleanly: {}", e);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(errors::Error::Io(e)) if e.kind() == io::ErrorKind::Interrupted => ExitCode::SUCCESS,
        Err(e) => {
            println!("\nError: {}", e);
            ExitCode::FAILURE
        }
    }
}
