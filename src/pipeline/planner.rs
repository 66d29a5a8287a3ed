use std::collections::HashSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::identifier::IdentifierMatcher;
use crate::model::WorkItem;
use crate::store::ProgressStore;
use crate::util::has_extension;

pub const TRANSCRIPT_SUFFIX: &str = "_transcript.txt";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub pdfs_discovered: usize,
    pub skipped_completed: usize,
    pub skipped_missing_txt: usize,
    pub skipped_unidentified: usize,
    pub skipped_duplicate: usize,
    pub queued: usize,
}

#[derive(Debug)]
pub struct UploadPlan {
    pub summary: PlanSummary,
    pub batches: Batches,
}

/// Fixed-size batches over a snapshot of pending work. Consumed once.
#[derive(Debug)]
pub struct Batches {
    items: std::vec::IntoIter<WorkItem>,
    batch_size: NonZeroUsize,
}

impl Batches {
    fn new(items: Vec<WorkItem>, batch_size: NonZeroUsize) -> Self {
        Self {
            items: items.into_iter(),
            batch_size,
        }
    }
}

impl Iterator for Batches {
    type Item = Vec<WorkItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<WorkItem> = self.items.by_ref().take(self.batch_size.get()).collect();
        (!batch.is_empty()).then_some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len().div_ceil(self.batch_size.get());
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches {}

pub fn transcript_path_for(txt_dir: &Path, base_identifier: &str) -> PathBuf {
    txt_dir.join(format!("{base_identifier}{TRANSCRIPT_SUFFIX}"))
}

/// Pairs every PDF under `pdf_dir` with `<base>_transcript.txt` under
/// `txt_dir`, dropping items the store already marks complete. Reads disk
/// and store at call time.
pub fn plan_uploads(
    pdf_dir: &Path,
    txt_dir: &Path,
    store: &ProgressStore,
    matcher: &IdentifierMatcher,
    batch_size: NonZeroUsize,
) -> Result<UploadPlan> {
    let mut pdf_paths = discover_pdfs(pdf_dir)?;
    pdf_paths.sort();

    let mut summary = PlanSummary {
        pdfs_discovered: pdf_paths.len(),
        ..PlanSummary::default()
    };
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for pdf_path in pdf_paths {
        let stem = pdf_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();

        let base_identifier = match matcher.extract(stem) {
            Ok(base) => base.to_string(),
            Err(err) => {
                warn!(path = %pdf_path.display(), error = %err, "skipping PDF without base identifier");
                summary.skipped_unidentified += 1;
                continue;
            }
        };

        if store.is_complete(&base_identifier) {
            info!(base_identifier = %base_identifier, "skipping completed item");
            summary.skipped_completed += 1;
            continue;
        }

        let txt_path = transcript_path_for(txt_dir, &base_identifier);
        if !txt_path.is_file() {
            warn!(
                base_identifier = %base_identifier,
                expected = %txt_path.display(),
                "TXT file not found; skipping"
            );
            summary.skipped_missing_txt += 1;
            continue;
        }

        if !seen.insert(base_identifier.clone()) {
            warn!(
                base_identifier = %base_identifier,
                path = %pdf_path.display(),
                "another PDF already queued for this identifier; skipping"
            );
            summary.skipped_duplicate += 1;
            continue;
        }

        items.push(WorkItem {
            base_identifier,
            pdf_path,
            txt_path,
        });
    }

    summary.queued = items.len();
    info!(
        discovered = summary.pdfs_discovered,
        queued = summary.queued,
        skipped_completed = summary.skipped_completed,
        skipped_missing_txt = summary.skipped_missing_txt,
        skipped_unidentified = summary.skipped_unidentified,
        "planned uploads"
    );

    Ok(UploadPlan {
        summary,
        batches: Batches::new(items, batch_size),
    })
}

fn discover_pdfs(pdf_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    let entries =
        fs::read_dir(pdf_dir).with_context(|| format!("failed to read {}", pdf_dir.display()))?;

    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", pdf_dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        if has_extension(&path, "pdf") {
            pdfs.push(path);
        }
    }

    Ok(pdfs)
}
