use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::identifier::UNKNOWN_IDENTIFIER;
use crate::model::UuidMapping;
use crate::util::ensure_directory;

/// Base identifier to remote UUID, read once per upload run.
#[derive(Debug, Default)]
pub struct UuidMap {
    entries: HashMap<String, String>,
}

impl UuidMap {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut map = Self::default();
        let mut unknown_rows = 0_usize;
        for (row_idx, row) in reader.deserialize::<UuidMapping>().enumerate() {
            let row = row.with_context(|| {
                format!("failed to parse row {} of {}", row_idx + 1, path.display())
            })?;
            if row.base_identifier.trim().is_empty() || row.base_identifier == UNKNOWN_IDENTIFIER {
                unknown_rows += 1;
                continue;
            }
            map.insert(row);
        }

        info!(
            path = %path.display(),
            entries = map.len(),
            unknown_rows,
            "loaded UUID mapping"
        );
        Ok(map)
    }

    fn insert(&mut self, row: UuidMapping) {
        match self.entries.get(&row.base_identifier) {
            Some(existing) if existing != &row.uuid => {
                warn!(
                    base_identifier = %row.base_identifier,
                    kept = %existing,
                    ignored = %row.uuid,
                    "duplicate base identifier in UUID mapping"
                );
            }
            Some(_) => {}
            None => {
                self.entries.insert(row.base_identifier, row.uuid);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, base_identifier: &str) -> Result<&str, PipelineError> {
        self.entries
            .get(base_identifier)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::LookupMiss {
                base_identifier: base_identifier.to_string(),
            })
    }
}

impl FromIterator<UuidMapping> for UuidMap {
    fn from_iter<I: IntoIterator<Item = UuidMapping>>(iter: I) -> Self {
        let mut map = Self::default();
        for row in iter {
            map.insert(row);
        }
        map
    }
}

/// Appends crawl rows to the mapping file, flushing after each one so an
/// interrupted crawl keeps what it scraped.
pub struct UuidMapWriter {
    writer: csv::Writer<File>,
    rows_written: usize,
}

impl UuidMapWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    pub fn append(&mut self, row: &UuidMapping) -> Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("failed to write mapping for {}", row.uuid))?;
        self.writer.flush().context("failed to flush UUID mapping")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

/// Age of the mapping file, when the filesystem reports a modification time.
pub fn mapping_age(path: &Path) -> Option<Duration> {
    let modified = path.metadata().and_then(|meta| meta.modified()).ok()?;
    SystemTime::now().duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn mapping(original: &str, base: &str, uuid: &str) -> UuidMapping {
        UuidMapping {
            original_identifier: original.to_string(),
            base_identifier: base.to_string(),
            uuid: uuid.to_string(),
        }
    }

    #[test]
    fn writer_output_loads_back_and_skips_unknown_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("docs").join("uuid_mapping.csv");

        let mut writer = UuidMapWriter::create(&path).expect("create");
        writer
            .append(&mapping("Box 1: mvp_1.0_001", "mvp_1.0_001", "aaa-111"))
            .expect("row 1");
        writer
            .append(&mapping("unknown", UNKNOWN_IDENTIFIER, "bbb-222"))
            .expect("row 2");
        writer
            .append(&mapping("mvp_1.0_002, copy", "mvp_1.0_002", "ccc-333"))
            .expect("row 3");
        assert_eq!(writer.rows_written(), 3);
        drop(writer);

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.starts_with("OriginalIdentifier,BaseIdentifier,UUID\n"));

        let map = UuidMap::load(&path).expect("load");
        assert_eq!(map.len(), 2);
        assert_eq!(map.lookup("mvp_1.0_002").ok(), Some("ccc-333"));
    }

    #[test]
    fn lookup_miss_names_the_identifier() {
        let map: UuidMap = [mapping("x", "mvp_1.0_001", "aaa")].into_iter().collect();
        let err = map.lookup("mvp_4.4_404").expect_err("miss");
        assert!(matches!(err, PipelineError::LookupMiss { ref base_identifier } if base_identifier == "mvp_4.4_404"));
    }

    #[test]
    fn duplicate_base_identifiers_keep_first_uuid() {
        let map: UuidMap = [
            mapping("a", "mvp_1.0_001", "first"),
            mapping("b", "mvp_1.0_001", "second"),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.len(), 1);
        assert_eq!(map.lookup("mvp_1.0_001").ok(), Some("first"));
    }
}
