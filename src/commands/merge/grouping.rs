use super::*;

/// Source text files that merge into one transcript, in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct TranscriptGroup {
    pub id: String,
    pub sources: Vec<PathBuf>,
}

/// Splits `<prefix>_<volume>_<page>` stems into a group id and page number.
pub(super) struct StemParser {
    pattern: Regex,
}

impl StemParser {
    pub(super) fn new() -> Result<Self> {
        let pattern = Regex::new(r"^(.+?)_(\d{3})_(\d{3})$")
            .context("failed to compile transcript page regex")?;
        Ok(Self { pattern })
    }

    /// Stems without a page suffix form a single-page group of their own.
    pub(super) fn parse(&self, stem: &str) -> (String, Option<u32>) {
        let Some(captures) = self.pattern.captures(stem) else {
            return (stem.to_string(), None);
        };
        let (Some(prefix), Some(volume), Some(page)) =
            (captures.get(1), captures.get(2), captures.get(3))
        else {
            return (stem.to_string(), None);
        };
        match page.as_str().parse() {
            Ok(page) => (format!("{}_{}", prefix.as_str(), volume.as_str()), Some(page)),
            Err(_) => (stem.to_string(), None),
        }
    }
}

/// Finds every `.txt` below `input_dir` and groups pages by stem.
pub(super) fn group_transcripts(
    input_dir: &Path,
    parser: &StemParser,
) -> Result<Vec<TranscriptGroup>> {
    let mut pages: BTreeMap<String, Vec<(Option<u32>, PathBuf)>> = BTreeMap::new();

    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry =
            entry.with_context(|| format!("failed to walk {}", input_dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || !has_extension(path, "txt") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!(path = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };

        let (group_id, page) = parser.parse(stem);
        pages
            .entry(group_id)
            .or_default()
            .push((page, path.to_path_buf()));
    }

    Ok(pages
        .into_iter()
        .map(|(id, mut sources)| {
            // Unnumbered file first, then pages in numeric order.
            sources.sort_by_key(|(page, _)| (page.is_some(), *page));
            TranscriptGroup {
                id,
                sources: sources.into_iter().map(|(_, path)| path).collect(),
            }
        })
        .collect())
}

/// Page text with non-ASCII characters removed and outer whitespace trimmed.
pub(super) fn read_clean_page(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(clean_page(&raw))
}

pub(super) fn clean_page(raw: &str) -> String {
    let ascii: String = raw.chars().filter(char::is_ascii).collect();
    ascii.trim().to_string()
}
