// src/ct_log/mod.rs
pub mod cache;
pub mod client;
pub mod types;

pub use cache::{CachedEntries, EntriesCache};
pub use client::CtLogClient;
pub use types::{LogEntry, SignedTreeHead};
