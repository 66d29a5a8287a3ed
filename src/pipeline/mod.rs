//! Upload pipeline: plan pending work, push each item through the driver
//! with bounded retries, and summarize the progress store.

use std::num::NonZeroU32;

use anyhow::Result;
use tracing::info;

use crate::model::{FailedItemEntry, WorkItem};
use crate::store::ProgressStore;

mod driver;
mod planner;
mod report;
mod retry;

pub use driver::{AuthError, UploadDriver};
pub use planner::{PlanSummary, plan_uploads};
pub use report::emit_report;
pub use retry::{DEFAULT_MAX_RETRIES, ItemOutcome, ItemState, ProcessedLayout, RetryController};

#[derive(Debug, Clone, Default)]
pub struct RunTally {
    pub batches: usize,
    pub items_attempted: usize,
    pub items_completed: usize,
    pub items_failed: usize,
    pub driver_calls: usize,
    pub failures: Vec<FailedItemEntry>,
    pub warnings: Vec<String>,
}

impl RunTally {
    fn absorb(&mut self, outcome: ItemOutcome) {
        self.items_attempted += 1;
        self.driver_calls += outcome.attempts_this_run() as usize;
        self.warnings.extend(outcome.warnings);

        match outcome.state {
            ItemState::Completed { .. } => self.items_completed += 1,
            ItemState::Failed { attempts, error } => {
                self.items_failed += 1;
                self.failures.push(FailedItemEntry {
                    base_identifier: outcome.base_identifier,
                    attempts,
                    last_error: error,
                });
            }
            ItemState::Pending | ItemState::Attempting { .. } => {}
        }
    }
}

/// Processes batches strictly in order, one item at a time.
pub fn execute_batches<D, I>(
    driver: &mut D,
    store: &mut ProgressStore,
    batches: I,
    processed: &ProcessedLayout,
    max_retries: NonZeroU32,
) -> Result<RunTally>
where
    D: UploadDriver + ?Sized,
    I: IntoIterator<Item = Vec<WorkItem>>,
{
    let mut controller = RetryController::new(driver, store, processed, max_retries);
    let mut tally = RunTally::default();

    for batch in batches {
        tally.batches += 1;
        info!(batch = tally.batches, items = batch.len(), "processing batch");

        for item in &batch {
            let outcome = controller.process(item)?;
            tally.absorb(outcome);
        }
    }

    info!(
        batches = tally.batches,
        completed = tally.items_completed,
        failed = tally.items_failed,
        store_records = controller.store().len(),
        "all batches processed"
    );
    Ok(tally)
}
