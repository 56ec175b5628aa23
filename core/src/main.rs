use clap::Parser;
use hanging_core::cli::{execute, Cli};
use log::error;
use std::process;

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match execute(&cli) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
