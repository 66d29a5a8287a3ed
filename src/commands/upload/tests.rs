use std::fs;

use super::run::{run_status, upload_counts};
use super::*;

fn args_for(root: &Path) -> UploadArgs {
    UploadArgs {
        docs_dir: root.join("docs"),
        config_path: None,
        uuid_map_path: None,
        progress_path: None,
        report_path: None,
        manifest_path: None,
        input_dir: root.join("input"),
        processed_dir: root.join("output"),
        batch_size: 10,
        max_retries: 3,
        webdriver_url: "http://localhost:9515".to_string(),
        headless: false,
        screenshot_dir: root.join("screenshots"),
        uuid_map_max_age_days: 30,
    }
}

fn seed_workspace(root: &Path) {
    fs::create_dir_all(root.join("docs")).expect("docs dir");
    fs::create_dir_all(root.join("input/pdf")).expect("pdf dir");
    fs::create_dir_all(root.join("input/txt")).expect("txt dir");
    fs::write(
        root.join("docs/config.toml"),
        r#"[credentials]
base_url = "https://lib.example.org"
collection_url = "https://lib.example.org/collections/oral-history"
collection_href = "/collections/oral-history/"
account = "uploader"
password = "secret"
"#,
    )
    .expect("config");
    fs::write(
        root.join("docs/uuid_mapping.csv"),
        "OriginalIdentifier,BaseIdentifier,UUID\nmvp_1.0_001_full,mvp_1.0_001,aaaa-1111\n",
    )
    .expect("uuid map");
}

#[test]
fn resolve_defaults_under_docs_dir() {
    let args = args_for(Path::new("/work"));
    let paths = RunPaths::resolve(&args, "20260101T000000Z");

    assert_eq!(paths.config, PathBuf::from("/work/docs/config.toml"));
    assert_eq!(paths.uuid_map, PathBuf::from("/work/docs/uuid_mapping.csv"));
    assert_eq!(paths.progress, PathBuf::from("/work/docs/upload_progress.csv"));
    assert_eq!(paths.report, PathBuf::from("/work/docs/upload_report.txt"));
    assert_eq!(
        paths.manifest,
        PathBuf::from("/work/docs/manifests/upload_run_20260101T000000Z.json")
    );
    assert_eq!(paths.pdf_input, PathBuf::from("/work/input/pdf"));
    assert_eq!(paths.processed.txt_dir, PathBuf::from("/work/output/txt"));
}

#[test]
fn explicit_paths_override_defaults() {
    let mut args = args_for(Path::new("/work"));
    args.progress_path = Some(PathBuf::from("/elsewhere/progress.csv"));
    let paths = RunPaths::resolve(&args, "stamp");
    assert_eq!(paths.progress, PathBuf::from("/elsewhere/progress.csv"));
}

#[test]
fn preconditions_list_every_missing_path_but_not_progress() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = RunPaths::resolve(&args_for(dir.path()), "stamp");

    let missing = paths.missing_preconditions();
    assert_eq!(
        missing,
        vec![
            paths.uuid_map.clone(),
            paths.config.clone(),
            paths.pdf_input.clone(),
            paths.txt_input.clone(),
        ]
    );

    seed_workspace(dir.path());
    assert!(paths.missing_preconditions().is_empty());
    assert!(!paths.progress.exists());
}

#[test]
fn check_preconditions_fails_with_typed_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = RunPaths::resolve(&args_for(dir.path()), "stamp");

    let err = check_preconditions(&paths).expect_err("missing inputs");
    let typed = err
        .downcast_ref::<PipelineError>()
        .expect("startup precondition error");
    assert!(matches!(typed, PipelineError::StartupPrecondition { missing } if missing.len() == 4));
}

#[test]
fn stale_mapping_warns_only_past_the_limit() {
    let path = Path::new("docs/uuid_mapping.csv");
    let day = Duration::from_secs(SECONDS_PER_DAY);

    assert_eq!(stale_mapping_warning(path, None, 30), None);
    assert_eq!(stale_mapping_warning(path, Some(day * 30), 30), None);

    let warning = stale_mapping_warning(path, Some(day * 45), 30).expect("stale warning");
    assert!(warning.contains("45 days old"), "{warning}");
    assert!(warning.contains("map-uuids"), "{warning}");
}

#[test]
fn render_upload_command_includes_optional_flags() {
    let mut args = args_for(Path::new("w"));
    args.headless = true;
    args.progress_path = Some(PathBuf::from("p.csv"));

    let command = render_upload_command(&args);
    assert!(command.starts_with("transcript-uploader upload --docs-dir w/docs"));
    assert!(command.contains("--progress-path p.csv"));
    assert!(command.contains("--max-retries 3"));
    assert!(command.ends_with("--headless"));
    assert!(!command.contains("--config-path"));
}

#[test]
fn counts_merge_plan_and_tally() {
    let summary = PlanSummary {
        pdfs_discovered: 5,
        skipped_completed: 1,
        skipped_missing_txt: 1,
        skipped_unidentified: 0,
        skipped_duplicate: 1,
        queued: 2,
    };
    let tally = RunTally {
        batches: 1,
        items_attempted: 2,
        items_completed: 1,
        items_failed: 1,
        driver_calls: 4,
        ..RunTally::default()
    };

    let counts = upload_counts(&summary, &tally);
    assert_eq!(counts.pdfs_discovered, 5);
    assert_eq!(counts.skipped_duplicate, 1);
    assert_eq!(counts.driver_calls, 4);
    assert_eq!(run_status(&tally), "completed_with_failures");
    assert_eq!(run_status(&RunTally::default()), "completed");
}

#[test]
fn run_without_pending_items_skips_browser_and_writes_outputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    seed_workspace(dir.path());
    fs::write(dir.path().join("input/pdf/mvp_1.0_001.pdf"), b"%PDF").expect("pdf");
    fs::write(
        dir.path().join("docs/upload_progress.csv"),
        "BaseIdentifier,PDF,TXT,Metadata,Timestamp,Attempts,LastError\n\
         mvp_1.0_001,Yes,Yes,Yes,2026-01-01T00:00:00Z,1,\n",
    )
    .expect("progress");

    let mut args = args_for(dir.path());
    args.manifest_path = Some(dir.path().join("docs/manifests/run.json"));
    // Nothing listens here; reaching the browser would fail the run.
    args.webdriver_url = "http://127.0.0.1:1".to_string();

    run(args).expect("upload run");

    let report = fs::read_to_string(dir.path().join("docs/upload_report.txt")).expect("report");
    assert!(report.contains("Successfully completed: 1"));
    assert!(report.contains("Success rate: 100.00%"));

    let manifest: serde_json::Value = serde_json::from_slice(
        &fs::read(dir.path().join("docs/manifests/run.json")).expect("manifest"),
    )
    .expect("manifest json");
    assert_eq!(manifest["status"], "completed");
    assert_eq!(manifest["counts"]["skipped_completed"], 1);
    assert_eq!(manifest["counts"]["batches"], 0);
}

#[test]
fn zero_batch_size_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut args = args_for(dir.path());
    args.batch_size = 0;
    let err = run(args).expect_err("zero batch size");
    assert!(err.to_string().contains("--batch-size"));
}
