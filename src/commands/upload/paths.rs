use super::*;

pub(super) const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Every location an upload run touches, resolved from flags and defaults.
#[derive(Debug, Clone)]
pub(super) struct RunPaths {
    pub config: PathBuf,
    pub uuid_map: PathBuf,
    pub progress: PathBuf,
    pub report: PathBuf,
    pub manifest: PathBuf,
    pub pdf_input: PathBuf,
    pub txt_input: PathBuf,
    pub processed_root: PathBuf,
    pub processed: ProcessedLayout,
}

impl RunPaths {
    pub(super) fn resolve(args: &UploadArgs, run_stamp: &str) -> Self {
        let docs = &args.docs_dir;
        Self {
            config: args
                .config_path
                .clone()
                .unwrap_or_else(|| docs.join("config.toml")),
            uuid_map: args
                .uuid_map_path
                .clone()
                .unwrap_or_else(|| docs.join("uuid_mapping.csv")),
            progress: args
                .progress_path
                .clone()
                .unwrap_or_else(|| docs.join("upload_progress.csv")),
            report: args
                .report_path
                .clone()
                .unwrap_or_else(|| docs.join("upload_report.txt")),
            manifest: args.manifest_path.clone().unwrap_or_else(|| {
                docs.join("manifests")
                    .join(format!("upload_run_{run_stamp}.json"))
            }),
            pdf_input: args.input_dir.join("pdf"),
            txt_input: args.input_dir.join("txt"),
            processed_root: args.processed_dir.clone(),
            processed: ProcessedLayout::under(&args.processed_dir),
        }
    }

    /// Files and directories that must exist before any processing.
    /// The progress file is created on demand.
    pub(super) fn missing_preconditions(&self) -> Vec<PathBuf> {
        let files = [&self.uuid_map, &self.config];
        let dirs = [&self.pdf_input, &self.txt_input];

        files
            .into_iter()
            .filter(|path| !path.is_file())
            .chain(dirs.into_iter().filter(|path| !path.is_dir()))
            .cloned()
            .collect()
    }

    pub(super) fn manifest_paths(&self) -> UploadPaths {
        UploadPaths {
            config_path: self.config.display().to_string(),
            uuid_map_path: self.uuid_map.display().to_string(),
            progress_path: self.progress.display().to_string(),
            report_path: self.report.display().to_string(),
            pdf_input_dir: self.pdf_input.display().to_string(),
            txt_input_dir: self.txt_input.display().to_string(),
            processed_dir: self.processed_root.display().to_string(),
        }
    }
}

pub(super) fn check_preconditions(paths: &RunPaths) -> Result<()> {
    let missing = paths.missing_preconditions();
    if missing.is_empty() {
        return Ok(());
    }
    for path in &missing {
        error!(path = %path.display(), "required file or directory not found");
    }
    Err(PipelineError::StartupPrecondition { missing }.into())
}

/// A warning when the mapping file is older than `max_age_days`.
pub(super) fn stale_mapping_warning(
    path: &Path,
    age: Option<Duration>,
    max_age_days: u64,
) -> Option<String> {
    let days = age?.as_secs() / SECONDS_PER_DAY;
    (days > max_age_days).then(|| {
        format!(
            "{} is {days} days old (limit {max_age_days}); run map-uuids to pick up new items",
            path.display()
        )
    })
}

pub(super) fn render_upload_command(args: &UploadArgs) -> String {
    let mut command = vec![
        "transcript-uploader".to_string(),
        "upload".to_string(),
        "--docs-dir".to_string(),
        args.docs_dir.display().to_string(),
        "--input-dir".to_string(),
        args.input_dir.display().to_string(),
        "--processed-dir".to_string(),
        args.processed_dir.display().to_string(),
        "--batch-size".to_string(),
        args.batch_size.to_string(),
        "--max-retries".to_string(),
        args.max_retries.to_string(),
        "--webdriver-url".to_string(),
        args.webdriver_url.clone(),
    ];

    for (flag, value) in [
        ("--config-path", &args.config_path),
        ("--uuid-map-path", &args.uuid_map_path),
        ("--progress-path", &args.progress_path),
        ("--report-path", &args.report_path),
        ("--manifest-path", &args.manifest_path),
    ] {
        if let Some(value) = value {
            command.push(flag.to_string());
            command.push(value.display().to_string());
        }
    }

    if args.headless {
        command.push("--headless".to_string());
    }

    command.join(" ")
}
