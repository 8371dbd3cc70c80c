//! Canonical plan text and its content hash.
//!
//! The hash doubles as session id and artifact directory key, so nothing
//! run-specific (time, randomness, environment) may enter the plan text.

use anyhow::{Result, bail};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Trimmed input.
    pub command_id: String,
    /// Exact bytes persisted as `plan.txt`.
    pub text: String,
    /// Lowercase hex SHA-256 of `text`.
    pub hash: String,
}

impl Plan {
    /// Build the plan for raw input. Blank input is rejected.
    pub fn from_input(input: &str) -> Result<Self> {
        let command_id = input.trim();
        if command_id.is_empty() {
            bail!("input is required");
        }
        let text = plan_text(command_id);
        let hash = content_hash(&text);
        Ok(Self {
            command_id: command_id.to_string(),
            text,
            hash,
        })
    }
}

pub fn plan_text(command_id: &str) -> String {
    format!("COMMAND:\n{command_id}\n")
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
