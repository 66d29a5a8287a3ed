use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use csv::StringRecord;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::model::ProgressRecord;
use crate::util::{ensure_directory, truncate_chars};

pub const PROGRESS_COLUMNS: [&str; 7] = [
    "BaseIdentifier",
    "PDF",
    "TXT",
    "Metadata",
    "Timestamp",
    "Attempts",
    "LastError",
];

/// Upper bound on stored error text, in characters.
pub const MAX_ERROR_CHARS: usize = 500;

/// Row as it appears on disk. Every column is optional so that tables written
/// by older tooling (or edited by hand) still load.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProgressRow {
    #[serde(rename = "BaseIdentifier")]
    base_identifier: Option<String>,
    #[serde(rename = "PDF")]
    pdf: Option<String>,
    #[serde(rename = "TXT")]
    txt: Option<String>,
    #[serde(rename = "Metadata")]
    metadata: Option<String>,
    #[serde(rename = "Timestamp")]
    timestamp: Option<String>,
    #[serde(rename = "Attempts")]
    attempts: Option<String>,
    #[serde(rename = "LastError")]
    last_error: Option<String>,
}

/// The CSV progress table, held in memory and rewritten after each change.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    records: Vec<ProgressRecord>,
}

impl ProgressStore {
    /// Loads the table, filling absent columns with defaults (`No`, no
    /// timestamp, zero attempts, empty error). A repaired table is written
    /// back immediately; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "progress file missing; starting empty store");
            return Ok(Self {
                path: path.to_path_buf(),
                records: Vec::new(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("failed to read header of {}", path.display()))?
            .clone();
        let missing: Vec<String> = PROGRESS_COLUMNS
            .iter()
            .filter(|column| !headers.iter().any(|header| header == **column))
            .map(|column| column.to_string())
            .collect();

        let mut store = Self {
            path: path.to_path_buf(),
            records: Vec::new(),
        };

        for (row_idx, row) in reader.records().enumerate() {
            let mut row = row.with_context(|| {
                format!("failed to read row {} of {}", row_idx + 1, path.display())
            })?;
            if row.len() > headers.len() {
                warn!(
                    path = %path.display(),
                    row = row_idx + 1,
                    fields = row.len(),
                    columns = headers.len(),
                    "progress row wider than header"
                );
                row = fold_overflow(&headers, &row);
            }
            let row: RawProgressRow = row.deserialize(Some(&headers)).with_context(|| {
                format!("failed to parse row {} of {}", row_idx + 1, path.display())
            })?;
            let Some(record) = migrate_row(row) else {
                warn!(path = %path.display(), row = row_idx + 1, "dropping progress row without BaseIdentifier");
                continue;
            };
            if store.position(&record.base_identifier).is_some() {
                warn!(base_identifier = %record.base_identifier, "duplicate progress row; keeping the later one");
            }
            store.replace_or_push(record);
        }

        if !missing.is_empty() {
            let repaired = PipelineError::StorageSchema {
                path: path.to_path_buf(),
                missing,
            };
            warn!(error = %repaired, "repairing progress file structure");
            store.flush()?;
        }

        info!(path = %path.display(), records = store.records.len(), "loaded progress store");
        Ok(store)
    }

    pub fn records(&self) -> &[ProgressRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, base_identifier: &str) -> Option<&ProgressRecord> {
        self.records
            .iter()
            .find(|record| record.base_identifier == base_identifier)
    }

    pub fn is_complete(&self, base_identifier: &str) -> bool {
        self.get(base_identifier)
            .map(|record| record.metadata_done)
            .unwrap_or(false)
    }

    /// Replaces the record with the same key, or appends it, then rewrites
    /// the whole table.
    pub fn upsert(&mut self, mut record: ProgressRecord) -> Result<()> {
        if record.last_error.chars().count() > MAX_ERROR_CHARS {
            record.last_error = truncate_chars(&record.last_error, MAX_ERROR_CHARS);
        }
        self.replace_or_push(record);
        self.flush()
    }

    fn position(&self, base_identifier: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.base_identifier == base_identifier)
    }

    fn replace_or_push(&mut self, record: ProgressRecord) {
        match self.position(&record.base_identifier) {
            Some(idx) => self.records[idx] = record,
            None => self.records.push(record),
        }
    }

    /// Writes to a sibling temp file and renames it over the table.
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            writer
                .write_record(PROGRESS_COLUMNS)
                .with_context(|| format!("failed to write header to {}", tmp_path.display()))?;
            for record in &self.records {
                writer.write_record(to_row(record)).with_context(|| {
                    format!(
                        "failed to write {} to {}",
                        record.base_identifier,
                        tmp_path.display()
                    )
                })?;
            }
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", tmp_path.display()))?;
        }

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "failed to replace {} with {}",
                self.path.display(),
                tmp_path.display()
            )
        })
    }
}

fn migrate_row(row: RawProgressRow) -> Option<ProgressRecord> {
    let base_identifier = row
        .base_identifier
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    Some(ProgressRecord {
        base_identifier,
        pdf_done: parse_flag(row.pdf.as_deref()),
        txt_done: parse_flag(row.txt.as_deref()),
        metadata_done: parse_flag(row.metadata.as_deref()),
        timestamp: row.timestamp.as_deref().and_then(parse_timestamp),
        attempts: row.attempts.as_deref().map(parse_attempts).unwrap_or(0),
        last_error: row.last_error.unwrap_or_default(),
    })
}

/// Unquoted commas in a hand-edited error message spill into extra fields;
/// those are joined back into `LastError` when it is the last column, and
/// dropped otherwise.
fn fold_overflow(headers: &StringRecord, row: &StringRecord) -> StringRecord {
    let width = headers.len();
    if headers.iter().last() != Some("LastError") {
        return row.iter().take(width).collect();
    }
    let mut folded: StringRecord = row.iter().take(width - 1).collect();
    let tail: Vec<&str> = row.iter().skip(width - 1).collect();
    folded.push_field(&tail.join(","));
    folded
}

fn to_row(record: &ProgressRecord) -> [String; 7] {
    [
        record.base_identifier.clone(),
        render_flag(record.pdf_done).to_string(),
        render_flag(record.txt_done).to_string(),
        render_flag(record.metadata_done).to_string(),
        record
            .timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
        record.attempts.to_string(),
        record.last_error.clone(),
    ]
}

pub fn render_flag(value: bool) -> &'static str {
    if value { "Yes" } else { "No" }
}

pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("yes" | "y" | "true" | "1")
    )
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

// Tables rewritten by dataframe tooling store counts as floats ("2.0").
fn parse_attempts(raw: &str) -> u32 {
    let raw = raw.trim();
    raw.parse::<u32>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite() && *value >= 0.0)
                .map(|value| value as u32)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, metadata_done: bool, attempts: u32) -> ProgressRecord {
        ProgressRecord {
            metadata_done,
            pdf_done: metadata_done,
            txt_done: metadata_done,
            attempts,
            ..ProgressRecord::new(id)
        }
    }

    #[test]
    fn load_of_missing_file_is_empty_and_flush_creates_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docs").join("upload_progress.csv");

        let mut store = ProgressStore::load(&path).expect("load missing");
        assert_eq!(store.len(), 0);
        assert!(!path.exists());

        store.upsert(record("mvp_1.0_001", true, 1)).expect("upsert");
        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.starts_with("BaseIdentifier,PDF,TXT,Metadata,Timestamp,Attempts,LastError"));
        assert!(raw.contains("mvp_1.0_001,Yes,Yes,Yes,,1,"));
    }

    #[test]
    fn load_repairs_missing_columns_and_rewrites_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_progress.csv");
        fs::write(
            &path,
            "BaseIdentifier,Metadata,Attempts\nmvp_1.0_001,Yes,1.0\nmvp_1.0_002,No,\n",
        )
        .expect("seed");

        let store = ProgressStore::load(&path).expect("load partial");
        assert_eq!(store.len(), 2);

        let first = store.get("mvp_1.0_001").expect("first row");
        assert!(first.metadata_done);
        assert!(!first.pdf_done);
        assert_eq!(first.attempts, 1);
        assert!(first.timestamp.is_none());

        let second = store.get("mvp_1.0_002").expect("second row");
        assert!(!second.metadata_done);
        assert_eq!(second.attempts, 0);
        assert_eq!(second.last_error, "");

        let rewritten = fs::read_to_string(&path).expect("read rewritten");
        assert!(
            rewritten.starts_with("BaseIdentifier,PDF,TXT,Metadata,Timestamp,Attempts,LastError\n"),
            "{rewritten}"
        );
    }

    #[test]
    fn load_accepts_naive_iso_timestamps_and_quoted_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_progress.csv");
        fs::write(
            &path,
            "BaseIdentifier,PDF,TXT,Metadata,Timestamp,Attempts,LastError\n\
             mvp_2.0_010,No,No,No,2025-03-14T09:26:53.589793,2,\"Timeout, element #edit-submit\"\n",
        )
        .expect("seed");

        let store = ProgressStore::load(&path).expect("load");
        let row = store.get("mvp_2.0_010").expect("row");
        assert_eq!(row.attempts, 2);
        assert_eq!(row.last_error, "Timeout, element #edit-submit");
        assert_eq!(
            row.timestamp.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Some("2025-03-14T09:26:53Z".to_string())
        );
    }

    #[test]
    fn load_matches_headers_with_surrounding_spaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_progress.csv");
        fs::write(
            &path,
            "BaseIdentifier, PDF, TXT, Metadata, Timestamp, Attempts, LastError
             mvp_1.0_001,Yes,Yes,Yes,,1,
",
        )
        .expect("seed");

        let store = ProgressStore::load(&path).expect("load");
        assert!(store.is_complete("mvp_1.0_001"));
        let row = store.get("mvp_1.0_001").expect("row");
        assert!(row.pdf_done && row.txt_done);
        assert_eq!(row.attempts, 1);
    }

    #[test]
    fn load_folds_unquoted_commas_back_into_last_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_progress.csv");
        fs::write(
            &path,
            "BaseIdentifier,PDF,TXT,Metadata,Timestamp,Attempts,LastError
             mvp_1.0_002,No,No,No,,2,Timeout, element missing
",
        )
        .expect("seed");

        let store = ProgressStore::load(&path).expect("load");
        let row = store.get("mvp_1.0_002").expect("row");
        assert_eq!(row.attempts, 2);
        assert_eq!(row.last_error, "Timeout, element missing");
    }

    #[test]
    fn upsert_replaces_existing_record_without_growing_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("upload_progress.csv");
        let mut store = ProgressStore::load(&path).expect("load");

        store.upsert(record("mvp_1.0_001", false, 1)).expect("first");
        store.upsert(record("mvp_1.0_002", false, 1)).expect("second");
        assert_eq!(store.len(), 2);

        store.upsert(record("mvp_1.0_001", true, 2)).expect("replace");
        assert_eq!(store.len(), 2);
        assert!(store.is_complete("mvp_1.0_001"));
        assert!(!store.is_complete("mvp_1.0_002"));
        assert!(!store.is_complete("mvp_9.9_999"));

        let reloaded = ProgressStore::load(&path).expect("reload");
        assert_eq!(reloaded.records(), store.records());
    }

    #[test]
    fn upsert_truncates_long_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = ProgressStore::load(&dir.path().join("p.csv")).expect("load");

        let mut failing = record("mvp_1.0_003", false, 3);
        failing.last_error = "x".repeat(MAX_ERROR_CHARS + 120);
        store.upsert(failing).expect("upsert");

        let stored = store.get("mvp_1.0_003").expect("stored");
        assert_eq!(stored.last_error.chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn parse_flag_accepts_common_truthy_spellings() {
        assert!(parse_flag(Some("Yes")));
        assert!(parse_flag(Some(" yes ")));
        assert!(parse_flag(Some("True")));
        assert!(!parse_flag(Some("No")));
        assert!(!parse_flag(Some("")));
        assert!(!parse_flag(None));
    }
}
