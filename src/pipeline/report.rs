use std::fmt::{self, Write as _};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::model::{FailedItemEntry, ProgressRecord};
use crate::util::ensure_directory;

#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// `completed / total`, or 0 for an empty store.
    pub success_rate: f64,
    pub failures: Vec<FailedItemEntry>,
}

impl ProgressReport {
    pub fn from_records(records: &[ProgressRecord]) -> Self {
        let total = records.len();
        let completed = records.iter().filter(|record| record.metadata_done).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };

        let failures = records
            .iter()
            .filter(|record| !record.metadata_done)
            .map(|record| FailedItemEntry {
                base_identifier: record.base_identifier.clone(),
                attempts: record.attempts,
                last_error: record.last_error.clone(),
            })
            .collect();

        Self {
            total,
            completed,
            failed: total - completed,
            success_rate,
            failures,
        }
    }

    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        writeln!(out, "=== UPLOAD PROCESSING REPORT ===")?;
        writeln!(out, "Total files processed: {}", self.total)?;
        writeln!(out, "Successfully completed: {}", self.completed)?;
        writeln!(out, "Failed uploads: {}", self.failed)?;
        writeln!(out, "Success rate: {:.2}%", self.success_rate * 100.0)?;
        writeln!(out)?;
        writeln!(out, "Failed items:")?;

        if self.failures.is_empty() {
            writeln!(out, "None")?;
        }
        for failure in &self.failures {
            writeln!(
                out,
                "- {}: Attempts {}, Last error: {}",
                failure.base_identifier, failure.attempts, failure.last_error
            )?;
        }
        Ok(out)
    }
}

/// Renders the report to stdout and to `report_path`.
pub fn emit_report(records: &[ProgressRecord], report_path: &Path) -> Result<ProgressReport> {
    let report = ProgressReport::from_records(records);
    let rendered = report.render().context("failed to render upload report")?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output)?;
    output.write_all(rendered.as_bytes())?;
    output.flush()?;

    if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    fs::write(report_path, &rendered)
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    info!(
        path = %report_path.display(),
        total = report.total,
        completed = report.completed,
        failed = report.failed,
        "wrote upload report"
    );
    Ok(report)
}
