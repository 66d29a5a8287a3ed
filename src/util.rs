use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory(parent)?;
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}

/// Moves `source` into `dest_dir`, keeping its file name.
pub fn move_into(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    ensure_directory(dest_dir)?;

    let file_name = source
        .file_name()
        .with_context(|| format!("path has no file name: {}", source.display()))?;
    let dest = dest_dir.join(file_name);

    if fs::rename(source, &dest).is_err() {
        // rename fails across filesystems
        fs::copy(source, &dest).with_context(|| {
            format!("failed to copy {} to {}", source.display(), dest.display())
        })?;
        fs::remove_file(source)
            .with_context(|| format!("failed to remove {}", source.display()))?;
    }

    Ok(dest)
}

/// Truncates to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_respects_multibyte_boundaries() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[test]
    fn move_into_relocates_file_and_creates_destination() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("a.pdf");
        fs::write(&source, b"pdf").expect("write source");

        let dest = move_into(&source, &dir.path().join("out").join("pdf")).expect("move");

        assert!(!source.exists());
        assert_eq!(fs::read(&dest).expect("read dest"), b"pdf");
        assert!(dest.ends_with("out/pdf/a.pdf"));
    }

    #[test]
    fn has_extension_is_case_insensitive() {
        assert!(has_extension(Path::new("x/Item.PDF"), "pdf"));
        assert!(!has_extension(Path::new("x/Item.txt"), "pdf"));
        assert!(!has_extension(Path::new("x/Item"), "pdf"));
    }
}
