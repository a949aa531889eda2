// src/lib.rs
// Library interface for ct-adoption
pub mod cert_parser;
pub mod cli;
pub mod config;
pub mod ct_log;
pub mod filter;
pub mod metrics;
pub mod probe;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod shutdown;
pub mod source;
pub mod stats;
pub mod types;
