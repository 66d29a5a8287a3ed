use super::*;

pub fn run(args: UploadArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_stamp = utc_compact_string(started_ts);
    let run_id = format!("upload-{run_stamp}");

    let Some(batch_size) = NonZeroUsize::new(args.batch_size) else {
        bail!("--batch-size must be at least 1");
    };
    let Some(max_retries) = NonZeroU32::new(args.max_retries) else {
        bail!("--max-retries must be at least 1");
    };

    let paths = RunPaths::resolve(&args, &run_stamp);
    info!(
        run_id = %run_id,
        batch_size = batch_size.get(),
        max_retries = max_retries.get(),
        "starting upload run"
    );
    check_preconditions(&paths)?;

    let config = AppConfig::load(&paths.config)?;
    let matcher = IdentifierMatcher::new()?;
    let uuid_map = UuidMap::load(&paths.uuid_map)?;

    let mut warnings = Vec::new();
    if let Some(warning) = stale_mapping_warning(
        &paths.uuid_map,
        mapping_age(&paths.uuid_map),
        args.uuid_map_max_age_days,
    ) {
        warn!(warning = %warning, "UUID mapping may be stale");
        warnings.push(warning);
    }

    let mut store = ProgressStore::load(&paths.progress)?;
    let plan = plan_uploads(
        &paths.pdf_input,
        &paths.txt_input,
        &store,
        &matcher,
        batch_size,
    )?;
    info!(
        discovered = plan.summary.pdfs_discovered,
        queued = plan.summary.queued,
        batches = plan.batches.len(),
        "upload plan ready"
    );

    let tally = if plan.summary.queued == 0 {
        info!("no pending items; skipping browser session");
        RunTally::default()
    } else {
        let browser = WebDriver::connect(
            &args.webdriver_url,
            &BrowserOptions {
                headless: args.headless,
            },
        )
        .with_context(|| format!("failed to start browser session via {}", args.webdriver_url))?;

        let mut uploader = LibraryUploader::new(
            browser,
            config.credentials.clone(),
            uuid_map,
            matcher.clone(),
            ScreenshotArchive::new(&args.screenshot_dir, DEFAULT_KEEP),
        );
        uploader
            .login(&config.credentials)
            .context("cannot upload without a session")?;

        let tally = execute_batches(
            &mut uploader,
            &mut store,
            plan.batches,
            &paths.processed,
            max_retries,
        );
        uploader.close();
        tally?
    };

    let report = emit_report(store.records(), &paths.report)?;
    warnings.extend(tally.warnings.iter().cloned());

    let manifest = UploadRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: run_status(&tally).to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_upload_command(&args),
        batch_size: batch_size.get(),
        max_retries: max_retries.get(),
        paths: paths.manifest_paths(),
        counts: upload_counts(&plan.summary, &tally),
        failures: tally.failures,
        warnings,
    };
    write_json_pretty(&paths.manifest, &manifest)?;

    info!(path = %paths.manifest.display(), "wrote upload run manifest");
    info!(
        run_id = %run_id,
        completed = manifest.counts.items_completed,
        failed = manifest.counts.items_failed,
        store_total = report.total,
        "upload run completed"
    );

    Ok(())
}

pub(super) fn run_status(tally: &RunTally) -> &'static str {
    if tally.items_failed == 0 {
        "completed"
    } else {
        "completed_with_failures"
    }
}

pub(super) fn upload_counts(summary: &PlanSummary, tally: &RunTally) -> UploadCounts {
    UploadCounts {
        pdfs_discovered: summary.pdfs_discovered,
        skipped_completed: summary.skipped_completed,
        skipped_missing_txt: summary.skipped_missing_txt,
        skipped_unidentified: summary.skipped_unidentified,
        skipped_duplicate: summary.skipped_duplicate,
        batches: tally.batches,
        items_attempted: tally.items_attempted,
        items_completed: tally.items_completed,
        items_failed: tally.items_failed,
        driver_calls: tally.driver_calls,
    }
}
