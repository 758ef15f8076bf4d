mod cli;
mod config;
mod crontab;
mod error;
mod identity;
mod models;
mod prompt;
mod rcs;
mod reconcile;
mod session;
mod storage;
#[cfg(test)]
mod testing;

use tracing_subscriber::EnvFilter;

fn main() {
    // logs go to stderr so they never mix with `crontab -l` output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(error::exit_code(&e));
        }
    }
}
