// src/ct_log/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response from CT log's get-sth endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    pub timestamp: u64,
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

impl SignedTreeHead {
    /// Tree head timestamp (milliseconds since epoch) as a UTC time
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp as i64)
    }
}

/// Single entry from CT log's get-entries endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub leaf_input: String, // base64-encoded MerkleTreeLeaf
    pub extra_data: String, // base64-encoded certificate chain
}

/// Response wrapper for get-entries endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct GetEntriesResponse {
    pub entries: Vec<LogEntry>,
}
