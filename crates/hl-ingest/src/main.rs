//! Ingestion binary: scrape, derive, materialize, repeat.
//!
//! Exit codes: 0 normal termination, 1 unrecoverable config/DB error,
//! 2 authentication failure.
mod cli;
mod driver;

use clap::Parser;

fn main() {
    let args = cli::Cli::parse();
    match driver::run(args) {
        Ok(()) => {}
        Err(e) => {
            if e.downcast_ref::<hl_upstream::AuthError>().is_some() {
                eprintln!("{}", e);
                std::process::exit(2);
            }
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}
