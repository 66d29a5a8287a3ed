use anyhow::{Result, bail};

use crate::cli::ReportArgs;
use crate::pipeline::emit_report;
use crate::store::ProgressStore;

/// Regenerates the report from the progress file without touching the
/// remote system.
pub fn run(args: ReportArgs) -> Result<()> {
    let progress_path = args
        .progress_path
        .unwrap_or_else(|| args.docs_dir.join("upload_progress.csv"));
    let report_path = args
        .report_path
        .unwrap_or_else(|| args.docs_dir.join("upload_report.txt"));

    if !progress_path.is_file() {
        bail!("progress file not found: {}", progress_path.display());
    }

    let store = ProgressStore::load(&progress_path)?;
    emit_report(store.records(), &report_path)?;
    Ok(())
}
