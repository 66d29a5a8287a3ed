use std::path::PathBuf;

use thiserror::Error;

/// Failures that cross component boundaries in the upload pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no base identifier found in {input:?}")]
    NotFound { input: String },

    #[error("no UUID mapping found for {base_identifier}; re-run map-uuids if the item is new")]
    LookupMiss { base_identifier: String },

    #[error("remote interaction failed: {0}")]
    RemoteInteraction(String),

    #[error("{path} was missing columns [{}]; filled with defaults", missing.join(", "))]
    StorageSchema { path: PathBuf, missing: Vec<String> },

    #[error("required files or directories missing: {}", display_paths(missing))]
    StartupPrecondition { missing: Vec<PathBuf> },
}

impl PipelineError {
    /// Lookup misses cannot be fixed by trying again within the same run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteInteraction(_))
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
