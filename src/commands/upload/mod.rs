use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::browser::{BrowserOptions, DEFAULT_KEEP, LibraryUploader, ScreenshotArchive, WebDriver};
use crate::cli::UploadArgs;
use crate::config::AppConfig;
use crate::errors::PipelineError;
use crate::identifier::IdentifierMatcher;
use crate::model::{UploadCounts, UploadPaths, UploadRunManifest};
use crate::pipeline::{
    PlanSummary, ProcessedLayout, RunTally, UploadDriver, emit_report, execute_batches,
    plan_uploads,
};
use crate::store::{ProgressStore, UuidMap, mapping_age};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

mod paths;
mod run;
#[cfg(test)]
mod tests;

use paths::*;

pub use run::run;
