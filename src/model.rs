use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub base_identifier: String,
    pub pdf_path: PathBuf,
    pub txt_path: PathBuf,
}

/// Durable per-item state; one record per base identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub base_identifier: String,
    pub pdf_done: bool,
    pub txt_done: bool,
    pub metadata_done: bool,
    pub timestamp: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub last_error: String,
}

impl ProgressRecord {
    pub fn new(base_identifier: impl Into<String>) -> Self {
        Self {
            base_identifier: base_identifier.into(),
            pdf_done: false,
            txt_done: false,
            metadata_done: false,
            timestamp: None,
            attempts: 0,
            last_error: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidMapping {
    #[serde(rename = "OriginalIdentifier")]
    pub original_identifier: String,
    #[serde(rename = "BaseIdentifier")]
    pub base_identifier: String,
    #[serde(rename = "UUID")]
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadPaths {
    pub config_path: String,
    pub uuid_map_path: String,
    pub progress_path: String,
    pub report_path: String,
    pub pdf_input_dir: String,
    pub txt_input_dir: String,
    pub processed_dir: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadCounts {
    pub pdfs_discovered: usize,
    pub skipped_completed: usize,
    pub skipped_missing_txt: usize,
    pub skipped_unidentified: usize,
    pub skipped_duplicate: usize,
    pub batches: usize,
    pub items_attempted: usize,
    pub items_completed: usize,
    pub items_failed: usize,
    pub driver_calls: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItemEntry {
    pub base_identifier: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub paths: UploadPaths,
    pub counts: UploadCounts,
    pub failures: Vec<FailedItemEntry>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergedTranscriptEntry {
    pub group_id: String,
    pub page_count: usize,
    pub txt_path: String,
    pub txt_sha256: String,
    pub pdf_path: String,
    pub pdf_sha256: String,
    pub pdf_page_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub group_count: usize,
    pub groups: Vec<MergedTranscriptEntry>,
    pub failures: Vec<String>,
}
