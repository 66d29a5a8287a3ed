use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cli::MergeArgs;
use crate::model::{MergeManifest, MergedTranscriptEntry};
use crate::util::{ensure_directory, has_extension, now_utc_string, sha256_file, write_json_pretty};

mod grouping;
mod pdf_render;
mod run;
#[cfg(test)]
mod tests;

use grouping::*;
use pdf_render::*;

pub use run::run;
