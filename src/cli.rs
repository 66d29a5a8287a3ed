use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::DEFAULT_MAX_RETRIES;

#[derive(Parser, Debug)]
#[command(
    name = "transcript-uploader",
    version,
    about = "Batch upload of oral-history transcripts to the digital library"
)]
pub struct Cli {
    /// Also write logs to this file (upload runs default to docs/upload_log.txt).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Upload(UploadArgs),
    MapUuids(MapUuidsArgs),
    Report(ReportArgs),
    Merge(MergeArgs),
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[arg(long, default_value = "docs")]
    pub docs_dir: PathBuf,

    #[arg(long)]
    pub config_path: Option<PathBuf>,

    #[arg(long)]
    pub uuid_map_path: Option<PathBuf>,

    #[arg(long)]
    pub progress_path: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value = "files/file_uploader/input")]
    pub input_dir: PathBuf,

    #[arg(long, default_value = "files/file_uploader/output")]
    pub processed_dir: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    #[arg(long, default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    #[arg(long, default_value_t = false)]
    pub headless: bool,

    #[arg(long, default_value = "screenshots")]
    pub screenshot_dir: PathBuf,

    #[arg(long, default_value_t = 30)]
    pub uuid_map_max_age_days: u64,
}

#[derive(Args, Debug, Clone)]
pub struct MapUuidsArgs {
    #[arg(long, default_value = "docs")]
    pub docs_dir: PathBuf,

    #[arg(long)]
    pub config_path: Option<PathBuf>,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// Stop after this many listing pages.
    #[arg(long)]
    pub max_pages: Option<usize>,

    #[arg(long, default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    #[arg(long, default_value_t = false)]
    pub headless: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[arg(long, default_value = "docs")]
    pub docs_dir: PathBuf,

    #[arg(long)]
    pub progress_path: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MergeArgs {
    #[arg(long)]
    pub input_dir: PathBuf,

    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    /// Project status workbook (.xlsx, .xls, .ods) or CSV export.
    #[arg(long)]
    pub spreadsheet: PathBuf,

    #[arg(long, default_value = "docs/upload_progress.csv")]
    pub progress_path: PathBuf,

    /// Defaults to files/updated_project_status.xlsx for workbooks and
    /// files/updated_project_status.csv for CSV input.
    #[arg(long)]
    pub output_path: Option<PathBuf>,
}
