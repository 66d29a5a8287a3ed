use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::util::ensure_directory;

pub const DEFAULT_KEEP: usize = 50;
const PREFIX: &str = "error_screenshot_";

/// Error screenshots named `error_screenshot_<label>_<unix secs>.png`,
/// pruned to the newest `keep` files after every save.
#[derive(Debug, Clone)]
pub struct ScreenshotArchive {
    dir: PathBuf,
    keep: usize,
}

impl ScreenshotArchive {
    pub fn new(dir: impl Into<PathBuf>, keep: usize) -> Self {
        Self {
            dir: dir.into(),
            keep,
        }
    }

    pub fn save(&self, label: &str, png: &[u8]) -> Result<PathBuf> {
        ensure_directory(&self.dir)?;
        let secs = Utc::now().timestamp();
        let path = self
            .dir
            .join(format!("{PREFIX}{}_{secs}.png", sanitize_label(label)));
        fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;

        self.prune()?;
        Ok(path)
    }

    /// Deletes the oldest screenshots beyond the retention limit.
    pub fn prune(&self) -> Result<usize> {
        let mut stamped = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to read entry in {}", self.dir.display()))?
                .path();
            if let Some(secs) = screenshot_timestamp(&path) {
                stamped.push((secs, path));
            }
        }

        if stamped.len() <= self.keep {
            return Ok(0);
        }

        stamped.sort();
        let excess = stamped.len() - self.keep;
        let mut removed = 0;
        for (_, path) in stamped.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "deleted old screenshot");
                    removed += 1;
                }
                Err(err) => warn!(path = %path.display(), error = %err, "failed to delete screenshot"),
            }
        }
        Ok(removed)
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

fn screenshot_timestamp(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_prefix(PREFIX)?.strip_suffix(".png")?;
    let (_, secs) = stem.rsplit_once('_')?;
    secs.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_read_from_last_segment() {
        assert_eq!(
            screenshot_timestamp(Path::new("s/error_screenshot_login_failure_1700000000.png")),
            Some(1_700_000_000)
        );
        assert_eq!(screenshot_timestamp(Path::new("s/error_screenshot_x_abc.png")), None);
        assert_eq!(screenshot_timestamp(Path::new("s/notes_1700000000.png")), None);
    }

    #[test]
    fn prune_keeps_newest_files_and_ignores_foreign_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        for secs in [30_u64, 10, 50, 20, 40] {
            fs::write(
                dir.path().join(format!("error_screenshot_upload_{secs}.png")),
                b"png",
            )
            .expect("seed screenshot");
        }
        fs::write(dir.path().join("keep-me.png"), b"png").expect("foreign file");

        let archive = ScreenshotArchive::new(dir.path(), 2);
        assert_eq!(archive.prune().expect("prune"), 3);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "error_screenshot_upload_40.png".to_string(),
                "error_screenshot_upload_50.png".to_string(),
                "keep-me.png".to_string(),
            ]
        );
    }

    #[test]
    fn save_sanitizes_label() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = ScreenshotArchive::new(dir.path().join("shots"), DEFAULT_KEEP);
        let path = archive.save("url field/1", b"png").expect("save");
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("error_screenshot_url_field_1_"), "{name}");
    }

    #[test]
    fn save_stamps_current_unix_seconds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let archive = ScreenshotArchive::new(dir.path(), DEFAULT_KEEP);
        let before = Utc::now().timestamp();
        let path = archive.save("media_upload", b"png").expect("save");
        let after = Utc::now().timestamp();

        let secs = screenshot_timestamp(&path).expect("stamped name");
        let secs = i64::try_from(secs).expect("fits i64");
        assert!(before <= secs && secs <= after, "{secs} not in {before}..={after}");
    }
}
