use super::*;

pub fn run(args: MergeArgs) -> Result<()> {
    if !args.input_dir.is_dir() {
        bail!("input directory not found: {}", args.input_dir.display());
    }

    let pdf_dir = args.output_dir.join("pdf");
    let txt_dir = args.output_dir.join("txt");
    ensure_directory(&pdf_dir)?;
    ensure_directory(&txt_dir)?;

    let parser = StemParser::new()?;
    let groups = group_transcripts(&args.input_dir, &parser)?;
    info!(
        input = %args.input_dir.display(),
        groups = groups.len(),
        "discovered transcript groups"
    );

    let mut entries = Vec::with_capacity(groups.len());
    let mut failures = Vec::new();
    for group in &groups {
        match merge_group(group, &pdf_dir, &txt_dir) {
            Ok(entry) => {
                info!(
                    group = %entry.group_id,
                    pages = entry.page_count,
                    pdf_pages = entry.pdf_page_count,
                    "merged transcript"
                );
                entries.push(entry);
            }
            Err(err) => {
                warn!(group = %group.id, error = %format!("{err:#}"), "failed to merge group");
                failures.push(format!("{}: {err:#}", group.id));
            }
        }
    }

    let manifest = MergeManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_directory: args.input_dir.display().to_string(),
        group_count: entries.len(),
        groups: entries,
        failures,
    };
    let manifest_path = args.output_dir.join("merge_manifest.json");
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote merge manifest");
    info!(
        merged = manifest.group_count,
        failed = manifest.failures.len(),
        "merge completed"
    );
    Ok(())
}

pub(super) fn merge_group(
    group: &TranscriptGroup,
    pdf_dir: &Path,
    txt_dir: &Path,
) -> Result<MergedTranscriptEntry> {
    let pages = group
        .sources
        .iter()
        .map(|path| read_clean_page(path))
        .collect::<Result<Vec<_>>>()?;

    let prefix = format!("{}_transcript", group.id);
    let txt_path = txt_dir.join(format!("{prefix}.txt"));
    fs::write(&txt_path, pages.join("\n\n"))
        .with_context(|| format!("failed to write {}", txt_path.display()))?;

    let pdf_path = pdf_dir.join(format!("{prefix}.pdf"));
    let pdf_page_count = render_transcript_pdf(&pages, &pdf_path)?;

    Ok(MergedTranscriptEntry {
        group_id: group.id.clone(),
        page_count: pages.len(),
        txt_sha256: sha256_file(&txt_path)?,
        txt_path: txt_path.display().to_string(),
        pdf_sha256: sha256_file(&pdf_path)?,
        pdf_path: pdf_path.display().to_string(),
        pdf_page_count,
    })
}
