pub mod action;
pub mod batch;
pub mod chain_reader;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod operation;
pub mod porter;
pub mod repack;
pub mod snapshot;
pub mod txgen;
