use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use super::driver::UploadDriver;
use crate::model::{ProgressRecord, WorkItem};
use crate::store::{MAX_ERROR_CHARS, ProgressStore};
use crate::util::{move_into, truncate_chars};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Where successfully uploaded sources are moved.
#[derive(Debug, Clone)]
pub struct ProcessedLayout {
    pub pdf_dir: PathBuf,
    pub txt_dir: PathBuf,
}

impl ProcessedLayout {
    pub fn under(root: &Path) -> Self {
        Self {
            pdf_dir: root.join("pdf"),
            txt_dir: root.join("txt"),
        }
    }
}

/// Per-item lifecycle. Terminal states are `Completed` and `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Attempting { attempt: u32 },
    Completed { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub base_identifier: String,
    pub state: ItemState,
    pub warnings: Vec<String>,
}

impl ItemOutcome {
    /// Driver invocations made for this item in this run.
    pub fn attempts_this_run(&self) -> u32 {
        match &self.state {
            ItemState::Completed { attempts } | ItemState::Failed { attempts, .. } => *attempts,
            ItemState::Pending | ItemState::Attempting { .. } => 0,
        }
    }
}

/// Drives each work item through the upload driver with bounded retries,
/// persisting every attempt to the progress store.
pub struct RetryController<'a, D: UploadDriver + ?Sized> {
    driver: &'a mut D,
    store: &'a mut ProgressStore,
    processed: &'a ProcessedLayout,
    max_retries: NonZeroU32,
}

impl<'a, D: UploadDriver + ?Sized> RetryController<'a, D> {
    pub fn new(
        driver: &'a mut D,
        store: &'a mut ProgressStore,
        processed: &'a ProcessedLayout,
        max_retries: NonZeroU32,
    ) -> Self {
        Self {
            driver,
            store,
            processed,
            max_retries,
        }
    }

    pub fn store(&self) -> &ProgressStore {
        &*self.store
    }

    /// Runs one item to a terminal state. Only storage failures are returned
    /// as errors; upload failures end in `ItemState::Failed`.
    pub fn process(&mut self, item: &WorkItem) -> Result<ItemOutcome> {
        let mut state = ItemState::Pending;
        let mut warnings = Vec::new();

        while !state.is_terminal() {
            state = self.step(item, state, &mut warnings)?;
        }

        Ok(ItemOutcome {
            base_identifier: item.base_identifier.clone(),
            state,
            warnings,
        })
    }

    fn step(
        &mut self,
        item: &WorkItem,
        state: ItemState,
        warnings: &mut Vec<String>,
    ) -> Result<ItemState> {
        let attempt = match state {
            ItemState::Pending => return Ok(ItemState::Attempting { attempt: 1 }),
            ItemState::Attempting { attempt } => attempt,
            terminal => return Ok(terminal),
        };

        info!(
            base_identifier = %item.base_identifier,
            attempt,
            max_retries = self.max_retries.get(),
            "uploading"
        );

        match self
            .driver
            .upload(&item.base_identifier, &item.pdf_path, &item.txt_path)
        {
            Ok(()) => {
                warnings.extend(self.record_success(item)?);
                info!(base_identifier = %item.base_identifier, attempt, "marked completed");
                Ok(ItemState::Completed { attempts: attempt })
            }
            Err(err) => {
                let message = err.to_string();
                self.record_failure(item, &message)?;

                if err.is_retryable() && attempt < self.max_retries.get() {
                    warn!(
                        base_identifier = %item.base_identifier,
                        attempt,
                        error = %message,
                        "attempt failed; retrying"
                    );
                    Ok(ItemState::Attempting {
                        attempt: attempt + 1,
                    })
                } else {
                    error!(
                        base_identifier = %item.base_identifier,
                        attempt,
                        error = %message,
                        "final attempt failed"
                    );
                    Ok(ItemState::Failed {
                        attempts: attempt,
                        error: truncate_chars(&message, MAX_ERROR_CHARS),
                    })
                }
            }
        }
    }

    fn current_record(&self, base_identifier: &str) -> ProgressRecord {
        self.store
            .get(base_identifier)
            .cloned()
            .unwrap_or_else(|| ProgressRecord::new(base_identifier))
    }

    fn record_failure(&mut self, item: &WorkItem, message: &str) -> Result<()> {
        let mut record = self.current_record(&item.base_identifier);
        record.metadata_done = false;
        record.timestamp = Some(Utc::now());
        record.attempts = record.attempts.saturating_add(1);
        record.last_error = truncate_chars(message, MAX_ERROR_CHARS);
        self.store.upsert(record)
    }

    // The remote side is already updated, so a failed move is reported but
    // does not undo the completion.
    fn record_success(&mut self, item: &WorkItem) -> Result<Vec<String>> {
        let mut warnings = Vec::new();
        for (source, dest_dir) in [
            (&item.pdf_path, &self.processed.pdf_dir),
            (&item.txt_path, &self.processed.txt_dir),
        ] {
            if let Err(err) = move_into(source, dest_dir) {
                let message = format!(
                    "{}: uploaded but could not move {}: {err:#}",
                    item.base_identifier,
                    source.display()
                );
                warn!(warning = %message, "processed-file move failed");
                warnings.push(message);
            }
        }

        let mut record = self.current_record(&item.base_identifier);
        record.pdf_done = true;
        record.txt_done = true;
        record.metadata_done = true;
        record.timestamp = Some(Utc::now());
        record.attempts = record.attempts.saturating_add(1);
        record.last_error.clear();
        self.store.upsert(record)?;

        Ok(warnings)
    }
}
