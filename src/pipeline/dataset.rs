//! Dataset preparation.
//!
//! Turns input-source records into instruction/response pairs serialized as
//! JSONL, the format the executor trains on.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collaborators::Record;
use crate::registry::PreparedInput;

/// Instruction used for records that carry no prompt.
pub const DEFAULT_INSTRUCTION: &str = "Analyze this:";

/// One training example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLine {
    pub instruction: String,
    pub response: String,
}

impl From<&Record> for DatasetLine {
    fn from(record: &Record) -> Self {
        let instruction = record
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTION)
            .to_string();

        Self {
            instruction,
            response: record.content.clone(),
        }
    }
}

/// A materialized training dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    lines: Vec<DatasetLine>,
    jsonl: String,
}

impl PreparedDataset {
    /// Builds the dataset from records, preserving their order.
    pub fn from_records(records: &[Record]) -> Result<Self, serde_json::Error> {
        let lines: Vec<DatasetLine> = records.iter().map(DatasetLine::from).collect();

        let mut jsonl = String::new();
        for line in &lines {
            jsonl.push_str(&serde_json::to_string(line)?);
            jsonl.push('\n');
        }

        Ok(Self { lines, jsonl })
    }

    pub fn lines(&self) -> &[DatasetLine] {
        &self.lines
    }

    pub fn record_count(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn size_bytes(&self) -> u64 {
        self.jsonl.len() as u64
    }

    pub fn as_jsonl(&self) -> &str {
        &self.jsonl
    }

    /// SHA-256 hex digest of the JSONL content.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.jsonl.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Size and identity, as recorded on the job.
    pub fn summary(&self) -> PreparedInput {
        PreparedInput {
            record_count: self.record_count(),
            size_bytes: self.size_bytes(),
            digest: self.digest(),
        }
    }

    /// Writes the JSONL file, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.jsonl.as_bytes()).await
    }
}
