use super::run::merge_group;
use super::*;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir");
    }
    fs::write(path, content).expect("write source");
}

#[test]
fn stem_parser_splits_volume_and_page() {
    let parser = StemParser::new().expect("parser");
    assert_eq!(
        parser.parse("mvp_1.0_001_002_010"),
        ("mvp_1.0_001_002".to_string(), Some(10))
    );
    assert_eq!(parser.parse("interview_001"), ("interview_001".to_string(), None));
    assert_eq!(parser.parse("notes_01_002"), ("notes_01_002".to_string(), None));
}

#[test]
fn groups_put_unnumbered_file_first_then_pages_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write(&root.join("batch/a_001_010.txt"), "ten");
    write(&root.join("batch/a_001_002.txt"), "two");
    write(&root.join("a_001.txt"), "cover");
    write(&root.join("nested/deeper/b_002_001.txt"), "b1");
    write(&root.join("ignored.pdf"), "%PDF");

    let parser = StemParser::new().expect("parser");
    let groups = group_transcripts(root, &parser).expect("groups");

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].id, "a_001");
    assert_eq!(
        groups[0].sources,
        vec![
            root.join("a_001.txt"),
            root.join("batch/a_001_002.txt"),
            root.join("batch/a_001_010.txt"),
        ]
    );
    assert_eq!(groups[1].id, "b_002");
    assert_eq!(groups[1].sources, vec![root.join("nested/deeper/b_002_001.txt")]);
}

#[test]
fn clean_page_strips_non_ascii_and_trims() {
    assert_eq!(clean_page("  caf\u{e9} \u{2014} ok\n\n"), "caf  ok");
}

#[test]
fn layout_wraps_long_lines_at_fixed_width() {
    let long = "x".repeat(WRAP_CHARS * 2 + 5);
    let sheets = layout_pages(&[long]);

    assert_eq!(sheets.len(), 1);
    let top = PAGE_HEIGHT - MARGIN;
    let ys: Vec<i64> = sheets[0].iter().map(|line| line.y).collect();
    assert_eq!(ys, vec![top, top - LINE_HEIGHT, top - 2 * LINE_HEIGHT]);
    assert_eq!(sheets[0][0].text.len(), WRAP_CHARS);
    assert_eq!(sheets[0][2].text, "xxxxx");
}

#[test]
fn layout_spaces_lines_and_separates_pages() {
    let sheets = layout_pages(&["a\nb".to_string(), "c".to_string()]);
    let top = PAGE_HEIGHT - MARGIN;

    let placed: Vec<(i64, &str)> = sheets[0]
        .iter()
        .map(|line| (line.y, line.text.as_str()))
        .collect();
    assert_eq!(
        placed,
        vec![
            (top, "a"),
            (top - 2 * LINE_HEIGHT, "b"),
            (top - 6 * LINE_HEIGHT, "c"),
        ]
    );
}

#[test]
fn layout_starts_new_page_below_bottom_margin() {
    let page = vec!["x"; 24].join("\n");
    let sheets = layout_pages(&[page]);

    assert_eq!(sheets.len(), 2);
    assert_eq!(sheets[0].len(), 23);
    assert!(sheets[0].iter().all(|line| line.y >= MARGIN + LINE_HEIGHT));
    assert_eq!(sheets[1][0].y, PAGE_HEIGHT - MARGIN);
}

#[test]
fn layout_of_empty_transcript_is_one_blank_page() {
    let sheets = layout_pages(&[]);
    assert_eq!(sheets.len(), 1);
    assert!(sheets[0].is_empty());
}

#[test]
fn merge_group_writes_text_and_readable_pdf() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write(&root.join("in/t_001_001.txt"), "first (page)\n");
    write(&root.join("in/t_001_002.txt"), "  second \u{2603}");
    let pdf_dir = root.join("out/pdf");
    let txt_dir = root.join("out/txt");
    fs::create_dir_all(&pdf_dir).expect("pdf dir");
    fs::create_dir_all(&txt_dir).expect("txt dir");

    let group = TranscriptGroup {
        id: "t_001".to_string(),
        sources: vec![root.join("in/t_001_001.txt"), root.join("in/t_001_002.txt")],
    };
    let entry = merge_group(&group, &pdf_dir, &txt_dir).expect("merge");

    let merged = fs::read_to_string(txt_dir.join("t_001_transcript.txt")).expect("merged txt");
    assert_eq!(merged, "first (page)\n\nsecond");
    assert_eq!(entry.page_count, 2);
    assert_eq!(entry.pdf_page_count, 1);
    assert_eq!(entry.txt_sha256.len(), 64);

    let pdf = lopdf::Document::load(pdf_dir.join("t_001_transcript.pdf")).expect("load pdf");
    assert_eq!(pdf.get_pages().len(), 1);
}

#[test]
fn run_writes_manifest_and_records_failed_groups() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    write(&root.join("in/good_001_001.txt"), "hello");
    fs::create_dir_all(root.join("in")).expect("in dir");
    fs::write(root.join("in/bad_001_001.txt"), [0xff, 0xfe, 0x00]).expect("invalid utf8");

    run(MergeArgs {
        input_dir: root.join("in"),
        output_dir: root.join("out"),
    })
    .expect("merge run");

    let manifest: serde_json::Value = serde_json::from_slice(
        &fs::read(root.join("out/merge_manifest.json")).expect("manifest"),
    )
    .expect("manifest json");
    assert_eq!(manifest["group_count"], 1);
    assert_eq!(manifest["groups"][0]["group_id"], "good_001");
    assert_eq!(manifest["failures"].as_array().map(Vec::len), Some(1));
    assert!(root.join("out/pdf/good_001_transcript.pdf").is_file());
}

#[test]
fn run_requires_input_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = run(MergeArgs {
        input_dir: dir.path().join("missing"),
        output_dir: dir.path().join("out"),
    })
    .expect_err("missing input");
    assert!(err.to_string().contains("input directory not found"));
}
