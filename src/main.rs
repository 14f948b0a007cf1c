use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rust_mirrornet::cli::{self, Cli};

fn main() {
    // stdout carries the action stream, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli::run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
