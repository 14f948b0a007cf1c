pub mod generate;
pub mod keys;
pub mod snapshot;

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use crate::error::Result;

#[derive(Parser)]
#[command(name = "mirrornet")]
#[command(about = "Bootstrap a Steem testnet from mainnet state", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the testnet setup action stream
    Txgen {
        /// Configuration file (JSON, or TOML with a .toml extension)
        #[arg(short = 'c', long = "conffile")]
        conffile: String,
        /// Output file, - means stdout
        #[arg(short = 'o', long = "outfile", default_value = "-")]
        outfile: String,
    },
    /// Resolve procedural key placeholders in an action stream
    Keysub {
        #[arg(short = 'i', long = "input-file", default_value = "-")]
        input_file: String,
        #[arg(short = 'o', long = "output-file", default_value = "-")]
        output_file: String,
        /// Path to the get_dev_key tool
        #[arg(long = "get-dev-key", default_value = "get_dev_key")]
        get_dev_key: String,
    },
    /// Port operations from a live source chain
    Port {
        #[arg(short = 'c', long = "conffile")]
        conffile: String,
        #[arg(short = 'o', long = "outfile", default_value = "-")]
        outfile: String,
    },
    /// Dump accounts and witnesses of a mainnet node
    Snapshot {
        /// Mainnet steemd server
        #[arg(short = 's', long = "server", default_value = "http://127.0.0.1:8090")]
        server: String,
        #[arg(short = 'o', long = "outfile", default_value = "-")]
        outfile: String,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Txgen { conffile, outfile } => generate::handle_txgen_command(&conffile, &outfile),
        Commands::Keysub { input_file, output_file, get_dev_key } => {
            keys::handle_keysub_command(&input_file, &output_file, &get_dev_key)
        }
        Commands::Port { conffile, outfile } => generate::handle_port_command(&conffile, &outfile),
        Commands::Snapshot { server, outfile } => snapshot::handle_snapshot_command(&server, &outfile),
    }
}

/// `-` reads stdin.
pub fn open_input(path: &str) -> Result<Box<dyn BufRead>> {
    if path == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// `-` writes stdout.
pub fn open_output(path: &str) -> Result<Box<dyn Write>> {
    if path == "-" {
        Ok(Box::new(BufWriter::new(io::stdout())))
    } else {
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }
}
